use coulslater::core::precision::PrecisionMode;

pub struct DefaultsConfig {
    pub steps: usize,
    pub precision: PrecisionMode,
    pub qqrd2e: f64,
    pub max_nbors: usize,
    pub eflag: bool,
    pub vflag: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            steps: 1,
            precision: PrecisionMode::Mixed,
            qqrd2e: 332.06371,
            max_nbors: 128,
            eflag: true,
            vflag: true,
        }
    }
}
