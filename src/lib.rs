pub mod v1;

pub mod prelude {
    pub use crate::v1::cloud::*;
    pub use crate::v1::config::*;
    pub use crate::v1::datastore::Datastore;
    pub use crate::v1::manifest::*;
    pub use crate::v1::resource::{Presence::*, *};
    pub use crate::v1::storage::{
        file::{FileStorage, DEFAULT_STORE_FILE},
        memory::MemoryStorage,
    };
    pub use crate::v1::tir::{
        client::*, dataset::*, frameworks::FrameworkError, integration::*, lookup::*,
        model_endpoint::*, model_repo::*, node::*, private_cluster::*, sku::*, transport::ApiError,
        *,
    };
}
