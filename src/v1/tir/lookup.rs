//! Read-only lookups: teams, projects, IAMs, notebook images and SKU plans.
//!
//! Every listing carries a synthetic id built from its inputs so repeated
//! lookups with the same inputs compare equal.

use serde::{Deserialize, Serialize};

use super::{
    de::{id_string, int_or_string, nullable, scalar_string},
    transport::{ApiError, Call},
    TirClient, TirProvider,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listing<T> {
    pub id: String,
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
struct TeamDetails {
    #[serde(deserialize_with = "id_string")]
    team_id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ProjectDetails {
    #[serde(deserialize_with = "id_string")]
    project_id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct IamDetails {
    #[serde(deserialize_with = "id_string")]
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ImageVersion {
    #[serde(default, deserialize_with = "nullable")]
    version: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ImageDetails {
    #[serde(default, deserialize_with = "nullable")]
    name: String,
    #[serde(default, deserialize_with = "nullable")]
    versions: Vec<ImageVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeImage {
    pub image_name: String,
    pub versions: Vec<String>,
}

impl From<ImageDetails> for NodeImage {
    fn from(details: ImageDetails) -> Self {
        Self {
            image_name: details.name,
            versions: details.versions.into_iter().map(|v| v.version).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PlanPrice {
    #[serde(default, deserialize_with = "nullable")]
    sku_type: String,
    #[serde(default, deserialize_with = "int_or_string")]
    committed_days: i64,
    #[serde(default, deserialize_with = "scalar_string")]
    unit_price: String,
    #[serde(default, deserialize_with = "nullable")]
    currency: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SkuSpec {
    #[serde(default, deserialize_with = "nullable")]
    name: String,
    #[serde(default, deserialize_with = "scalar_string")]
    cpu: String,
    #[serde(default, deserialize_with = "scalar_string")]
    gpu: String,
    #[serde(default, deserialize_with = "scalar_string")]
    memory: String,
    #[serde(default, deserialize_with = "nullable")]
    plans: Vec<PlanPrice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SkuCatalog {
    #[serde(rename = "CPU", default, deserialize_with = "nullable")]
    cpu: Vec<SkuSpec>,
    #[serde(rename = "GPU", default, deserialize_with = "nullable")]
    gpu: Vec<SkuSpec>,
}

/// One purchasable plan of a SKU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkuPlanOffer {
    pub name: String,
    pub cpu: String,
    pub gpu: String,
    pub memory: String,
    pub sku_type: String,
    pub committed_days: i64,
    pub unit_price: String,
    pub currency: String,
}

impl SkuCatalog {
    /// CPU SKUs first, then GPU SKUs, one entry per plan.
    fn offers(self) -> Vec<SkuPlanOffer> {
        self.cpu
            .into_iter()
            .chain(self.gpu)
            .flat_map(|spec| {
                let SkuSpec {
                    name,
                    cpu,
                    gpu,
                    memory,
                    plans,
                } = spec;
                plans.into_iter().map(move |plan| SkuPlanOffer {
                    name: name.clone(),
                    cpu: cpu.clone(),
                    gpu: gpu.clone(),
                    memory: memory.clone(),
                    sku_type: plan.sku_type,
                    committed_days: plan.committed_days,
                    unit_price: plan.unit_price,
                    currency: plan.currency,
                })
            })
            .collect()
    }
}

/// Service whose SKU plans are listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanQuery {
    Notebook {
        image_name: String,
        image_version: String,
    },
    InferenceService {
        framework: String,
    },
    PrivateCloud,
}

impl PlanQuery {
    fn call(&self, active_iam: &str) -> Call {
        let call = Call::get("/gpu_service/sku/", active_iam);
        match self {
            PlanQuery::Notebook {
                image_name,
                image_version,
            } => call
                .query("service", "notebook")
                .query("image_name", image_name)
                .query("image_version", image_version),
            PlanQuery::InferenceService { framework } => call
                .query("service", "inference_service")
                .query("framework", framework),
            PlanQuery::PrivateCloud => call.query("service", "private_cloud"),
        }
    }
}

impl TirClient {
    pub async fn get_teams(&self, active_iam: &str) -> Result<Listing<String>, ApiError> {
        let teams: Vec<TeamDetails> = self
            .transport()
            .send(Call::get("/teams/", active_iam))
            .await?;
        Ok(Listing {
            id: format!("teams{}", active_iam),
            items: teams.into_iter().map(|t| t.team_id).collect(),
        })
    }

    pub async fn get_projects(
        &self,
        team_id: &str,
        active_iam: &str,
    ) -> Result<Listing<String>, ApiError> {
        let projects: Vec<ProjectDetails> = self
            .transport()
            .send(Call::get(format!("/teams/{}/projects/", team_id), active_iam))
            .await?;
        Ok(Listing {
            id: format!("projects{}{}", team_id, active_iam),
            items: projects.into_iter().map(|p| p.project_id).collect(),
        })
    }

    /// IAMs are account level, so no `active_iam` is sent.
    pub async fn get_iams(&self) -> Result<Listing<String>, ApiError> {
        let iams: Vec<IamDetails> = self
            .transport()
            .send(Call::get("/iam/multi-crn/", ""))
            .await?;
        Ok(Listing {
            id: "iams".to_string(),
            items: iams.into_iter().map(|i| i.id).collect(),
        })
    }

    /// Jupyter-enabled notebook images with their versions.
    pub async fn get_images(&self, active_iam: &str) -> Result<Listing<NodeImage>, ApiError> {
        let call = Call::get("/gpu_service/image/", active_iam)
            .query("category", "notebook")
            .query("is_jupyterlab_enabled", "true");
        let images: Vec<ImageDetails> = self.transport().send(call).await?;
        Ok(Listing {
            id: "images".to_string(),
            items: images.into_iter().map(NodeImage::from).collect(),
        })
    }

    pub async fn get_plans(
        &self,
        query: &PlanQuery,
        active_iam: &str,
    ) -> Result<Listing<SkuPlanOffer>, ApiError> {
        let catalog: SkuCatalog = self.transport().send(query.call(active_iam)).await?;
        Ok(Listing {
            id: "plans".to_string(),
            items: catalog.offers(),
        })
    }
}

impl TirProvider {
    pub fn teams(&self, active_iam: &str) -> Result<Listing<String>, ApiError> {
        self.block_on(self.client().get_teams(active_iam))
    }
    pub fn projects(&self, team_id: &str, active_iam: &str) -> Result<Listing<String>, ApiError> {
        self.block_on(self.client().get_projects(team_id, active_iam))
    }
    pub fn iams(&self) -> Result<Listing<String>, ApiError> {
        self.block_on(self.client().get_iams())
    }
    pub fn images(&self, active_iam: &str) -> Result<Listing<NodeImage>, ApiError> {
        self.block_on(self.client().get_images(active_iam))
    }
    pub fn plans(
        &self,
        query: &PlanQuery,
        active_iam: &str,
    ) -> Result<Listing<SkuPlanOffer>, ApiError> {
        self.block_on(self.client().get_plans(query, active_iam))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn catalog_flattens_cpu_then_gpu() {
        let catalog: SkuCatalog = serde_json::from_value(json!({
            "CPU": [{
                "name": "C3.8GB", "cpu": 4, "gpu": 0, "memory": "8GB",
                "plans": [
                    {"sku_type": "hourly", "committed_days": 0, "unit_price": 3.1, "currency": "INR"},
                    {"sku_type": "committed", "committed_days": 30, "unit_price": "2000", "currency": "INR"}
                ]
            }],
            "GPU": [{
                "name": "GDC.A100", "cpu": 16, "gpu": 1, "memory": "115GB",
                "plans": [{"sku_type": "hourly", "committed_days": null, "unit_price": 220, "currency": "INR"}]
            }]
        }))
        .unwrap();
        let offers = catalog.offers();
        assert_eq!(offers.len(), 3);
        assert_eq!(offers[0].cpu, "4");
        assert_eq!(offers[0].unit_price, "3.1");
        assert_eq!(offers[1].committed_days, 30);
        assert_eq!(offers[1].unit_price, "2000");
        assert_eq!(offers[2].name, "GDC.A100");
        assert_eq!(offers[2].gpu, "1");
    }

    #[test]
    fn plan_query_parameters() {
        let call = PlanQuery::Notebook {
            image_name: "pytorch".into(),
            image_version: "2.1".into(),
        }
        .call("9");
        assert_eq!(call.path, "/gpu_service/sku/");
        assert_eq!(
            call.query,
            vec![
                ("service".to_string(), "notebook".to_string()),
                ("image_name".to_string(), "pytorch".to_string()),
                ("image_version".to_string(), "2.1".to_string()),
            ]
        );
        let call = PlanQuery::PrivateCloud.call("9");
        assert_eq!(call.query, vec![("service".to_string(), "private_cloud".to_string())]);
    }

    #[test]
    fn images_collect_versions() {
        let details: ImageDetails = serde_json::from_value(json!({
            "name": "pytorch", "versions": [{"version": "2.1"}, {"version": "2.2"}]
        }))
        .unwrap();
        assert_eq!(
            NodeImage::from(details),
            NodeImage {
                image_name: "pytorch".into(),
                versions: vec!["2.1".into(), "2.2".into()],
            }
        );
    }
}
