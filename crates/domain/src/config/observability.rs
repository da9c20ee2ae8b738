use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Observability
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `[observability]`: where ChatBridge's request and session spans go.
///
/// Logs are always JSON on stdout, including the `cb_event` lines for
/// session milestones (created, pairing code published, opened,
/// reconnecting, closed, message sent). With `otlp_endpoint` set, the same
/// spans (one per HTTP request from the trace layer, plus the bridge
/// engine's per-session connection spans) are exported over OTLP/gRPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Collector address, e.g. `http://localhost:4317`. Unset disables export.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    /// Reported as `service.name`; set it per deployment when several
    /// bridges share one collector.
    #[serde(default = "d_service_name")]
    pub service_name: String,

    /// Fraction of traces exported, `0.0..=1.0`. Sampling is by trace id,
    /// so a long-polling `/qr` request is kept or dropped as a whole.
    #[serde(default = "d_sample_rate")]
    pub sample_rate: f64,
}

impl ObservabilityConfig {
    /// Whether an OTLP exporter should be started.
    pub fn export_enabled(&self) -> bool {
        self.otlp_endpoint
            .as_deref()
            .is_some_and(|e| !e.trim().is_empty())
    }

    pub fn sample_rate_is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.sample_rate)
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            service_name: d_service_name(),
            sample_rate: d_sample_rate(),
        }
    }
}

fn d_service_name() -> String {
    "chatbridge".into()
}

fn d_sample_rate() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_log_only() {
        let cfg: ObservabilityConfig = toml::from_str("").unwrap();
        assert!(!cfg.export_enabled());
        assert_eq!(cfg.service_name, "chatbridge");
        assert!(cfg.sample_rate_is_valid());
    }

    #[test]
    fn blank_endpoint_does_not_enable_export() {
        let cfg: ObservabilityConfig = toml::from_str(r#"otlp_endpoint = "  ""#).unwrap();
        assert!(!cfg.export_enabled());
    }

    #[test]
    fn per_deployment_collector() {
        let cfg: ObservabilityConfig = toml::from_str(
            r#"
            otlp_endpoint = "http://otel:4317"
            service_name = "chatbridge-eu"
            sample_rate = 0.1
        "#,
        )
        .unwrap();
        assert!(cfg.export_enabled());
        assert_eq!(cfg.service_name, "chatbridge-eu");
        assert!(cfg.sample_rate_is_valid());
    }

    #[test]
    fn sample_rate_outside_unit_interval_is_invalid() {
        for rate in [-0.1, 1.5, f64::NAN] {
            let cfg = ObservabilityConfig {
                sample_rate: rate,
                ..ObservabilityConfig::default()
            };
            assert!(!cfg.sample_rate_is_valid(), "{rate}");
        }
    }
}
