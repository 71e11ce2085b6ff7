//! Hub configuration

/// Configuration options for the presence hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of each member's outbound queue, in frames
    pub outbound_capacity: usize,
    /// Depth of the sequencer's command channel
    pub command_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 16,
            command_buffer: 64,
        }
    }
}

impl HubConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-member outbound queue capacity (minimum 1)
    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    /// Set the sequencer command channel depth (minimum 1)
    pub fn command_buffer(mut self, depth: usize) -> Self {
        self.command_buffer = depth.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.outbound_capacity, 16);
        assert_eq!(config.command_buffer, 64);
    }

    #[test]
    fn test_builder_chaining() {
        let config = HubConfig::new().outbound_capacity(4).command_buffer(8);
        assert_eq!(config.outbound_capacity, 4);
        assert_eq!(config.command_buffer, 8);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let config = HubConfig::new().outbound_capacity(0).command_buffer(0);
        assert_eq!(config.outbound_capacity, 1);
        assert_eq!(config.command_buffer, 1);
    }
}
