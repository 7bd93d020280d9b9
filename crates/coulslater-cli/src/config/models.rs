use coulslater::workflows::evaluate::EvaluateConfig;
use std::path::PathBuf;

pub struct AppConfig {
    pub system_path: PathBuf,
    pub forces_out: Option<PathBuf>,
    pub core_config: EvaluateConfig,
}
