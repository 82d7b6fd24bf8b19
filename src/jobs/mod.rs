//types de jobs d'encodage et structures du cycle de vie
use serde::{Deserialize, Serialize};

//états du cycle de vie (les horodatages sont en millisecondes epoch)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Unassigned,
    Assigned,
    Running,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Unassigned => "unassigned",
            JobStatus::Assigned => "assigned",
            JobStatus::Running => "running",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unassigned" => Some(JobStatus::Unassigned),
            "assigned" => Some(JobStatus::Assigned),
            "running" => Some(JobStatus::Running),
            "complete" => Some(JobStatus::Complete),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }

    //seuls ces états peuvent être posés par un update encodeur
    pub fn accepted_from_update(&self) -> bool {
        matches!(
            self,
            JobStatus::Assigned | JobStatus::Running | JobStatus::Failed
        )
    }
}

//identité de la vidéo cible, immuable après création
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobMetadata {
    pub video_owner: String,
    pub video_permlink: String,
}

//source du média
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobInput {
    pub uri: String,
    pub size: i64,
}

//avancement rapporté par l'encodeur, bornes [0,100]
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct JobProgress {
    pub download_pct: f64,
    pub pct: f64,
}

impl JobProgress {
    pub fn is_valid(&self) -> bool {
        (0.0..=100.0).contains(&self.download_pct) && (0.0..=100.0).contains(&self.pct)
    }
}

//résultat de l'encodage, le cid est obligatoire
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobResult {
    pub cid: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

//job complet tel que vu par le plan Aid
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub created_at: i64,
    pub assigned_date: Option<i64>,
    pub last_pinged: Option<i64>,
    pub completed_at: Option<i64>,
    pub assigned_to: Option<String>,
    pub metadata: JobMetadata,
    pub storage_metadata: Option<serde_json::Value>,
    pub input: JobInput,
    pub progress: Option<JobProgress>,
    pub result: Option<JobResult>,
}

impl Job {
    pub fn result_cid(&self) -> Option<&str> {
        self.result
            .as_ref()
            .map(|r| r.cid.as_str())
            .filter(|c| !c.is_empty())
    }
}

//vue réduite pour le listing des jobs disponibles
#[derive(Clone, Debug, Serialize)]
pub struct JobSummary {
    pub id: String,
    pub created_at: i64,
    pub metadata: JobMetadata,
    pub input: JobInput,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            created_at: job.created_at,
            metadata: job.metadata.clone(),
            input: job.input.clone(),
        }
    }
}
