use std::time::Duration;

/// Snapshot of what the pair style currently has provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionState {
    pub allocated: bool,
    /// Fast path: type tables staged in block-local memory.
    pub shared_types: bool,
    pub atom_capacity: usize,
    pub neighbor_rows: usize,
    /// Side of the packed type tables.
    pub table_dim: usize,
}

/// Timing and load figures accumulated between `init` and `clear`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    pub steps: usize,
    pub transfer: Duration,
    pub kernel: Duration,
    pub resizes: usize,
    device_fraction_sum: f64,
}

impl RunStats {
    pub fn record_transfer(&mut self, elapsed: Duration) {
        self.transfer += elapsed;
    }

    pub fn record_step(&mut self, kernel: Duration, device_atoms: usize, nlocal: usize) {
        self.steps += 1;
        self.kernel += kernel;
        self.device_fraction_sum += if nlocal == 0 {
            1.0
        } else {
            device_atoms as f64 / nlocal as f64
        };
    }

    pub fn average_device_fraction(&self) -> f64 {
        if self.steps == 0 {
            0.0
        } else {
            self.device_fraction_sum / self.steps as f64
        }
    }

    pub fn summary(&self, device_name: &str, peak_bytes: usize) -> String {
        format!(
            "\n--------------------------------------------------------------------------\n\
             -      Device Time Info (average) for coul/slater/long:\n\
             --------------------------------------------------------------------------\n\
             Device:               {device_name}\n\
             Steps:                {}\n\
             Data Transfer:        {:.4} s\n\
             Device Force Calc:    {:.4} s\n\
             Average Split:        {:.4}\n\
             Neighbor Resizes:     {}\n\
             Max Mem / Device:     {:.2} MB\n\
             --------------------------------------------------------------------------\n",
            self.steps,
            self.transfer.as_secs_f64() / self.steps.max(1) as f64,
            self.kernel.as_secs_f64() / self.steps.max(1) as f64,
            self.average_device_fraction(),
            self.resizes,
            peak_bytes as f64 / (1024.0 * 1024.0),
        )
    }
}
