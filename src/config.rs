use std::path::PathBuf;
use std::time::Duration;



/// Gateway settings, extracted from rocket's figment alongside rocket's own keys.
#[derive(Clone)]
#[derive(Debug)]
#[derive(Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
	/// YAML file holding cameras and users. `None` keeps the registry in memory.
	pub registry_path: Option<PathBuf>,
	pub static_dir: Option<PathBuf>,
	/// Lifetime of a camera session, sent to the camera as `remember` and used as the cache TTL.
	pub camera_session_hours: u32,
	pub operator_session_hours: u32,
	pub upstream_timeout_secs: u64,
	pub sweep_interval_secs: u64,
}

impl Default for GatewayConfig {
	fn default() -> Self {
		GatewayConfig {
			registry_path: Some(PathBuf::from("nvr-gateway.yaml")),
			static_dir: None,
			camera_session_hours: 1,
			operator_session_hours: 1,
			upstream_timeout_secs: 60,
			sweep_interval_secs: 600,
		}
	}
}

impl GatewayConfig {
	/// At least an hour, since cameras count `remember` in whole hours.
	pub fn camera_session_ttl(&self) -> Duration {
		hours(self.camera_session_hours.max(1))
	}

	pub fn operator_session_ttl(&self) -> Duration {
		hours(self.operator_session_hours)
	}

	pub fn upstream_timeout(&self) -> Duration {
		Duration::from_secs(self.upstream_timeout_secs)
	}

	pub fn sweep_interval(&self) -> Duration {
		Duration::from_secs(self.sweep_interval_secs.max(1))
	}
}

pub fn hours(count: u32) -> Duration {
	Duration::from_secs(u64::from(count) * 3600)
}



#[cfg(test)]
mod tests {
	use super::*;
	use rocket::figment::Figment;
	use rocket::figment::providers::Serialized;

	#[test]
	fn missing_keys_fall_back_to_defaults() {
		let figment = Figment::from(Serialized::defaults(serde_json::json!({
			"camera_session_hours": 2,
			"port": 9000,
		})));
		let config: GatewayConfig = figment.extract().unwrap();

		assert_eq!(config.camera_session_ttl(), Duration::from_secs(7200));
		assert_eq!(config.operator_session_ttl(), Duration::from_secs(3600));
		assert_eq!(config.upstream_timeout(), Duration::from_secs(60));
		assert_eq!(config.registry_path, Some(PathBuf::from("nvr-gateway.yaml")));
	}

	#[test]
	fn sweep_interval_is_never_zero() {
		let config = GatewayConfig { sweep_interval_secs: 0, ..GatewayConfig::default() };
		assert_eq!(config.sweep_interval(), Duration::from_secs(1));
	}

	#[test]
	fn camera_sessions_last_at_least_an_hour() {
		let config = GatewayConfig { camera_session_hours: 0, ..GatewayConfig::default() };
		assert_eq!(config.camera_session_ttl(), Duration::from_secs(3600));
	}
}
