use std::collections::HashMap;
use std::path::Path;

use rocket::figment::Figment;
use rocket::local::asynchronous::Client;
use rocket::serde::json::json;

use crate::camera_auth::CredentialStore;
use crate::common::CameraRecord;



pub struct FixedCameras(HashMap<String, CameraRecord>);

impl FixedCameras {
	pub fn new(cameras: Vec<CameraRecord>) -> Self {
		FixedCameras(cameras.into_iter().map(|camera| (camera.id.clone(), camera)).collect())
	}
}

#[rocket::async_trait]
impl CredentialStore for FixedCameras {
	async fn lookup_camera(&self, id: &str) -> Option<CameraRecord> {
		self.0.get(id).cloned()
	}
}

pub fn camera(id: &str, base_url: &str) -> CameraRecord {
	CameraRecord {
		id: id.into(),
		name: format!("Camera {}", id),
		base_url: base_url.into(),
		username: "admin".into(),
		password: "secret".into(),
	}
}

/// Rocket config for tests: registry in `dir`, seeded with `cameras`, and quiet logs.
pub fn figment(dir: &Path, cameras: &[CameraRecord]) -> Figment {
	let registry_path = dir.join("registry.yaml");
	let cameras: HashMap<&str, &CameraRecord> = cameras.iter().map(|c| (c.id.as_str(), c)).collect();
	let yaml = serde_yaml::to_string(&json!({ "cameras": cameras })).unwrap();
	std::fs::write(&registry_path, yaml).unwrap();

	rocket::Config::figment()
		.merge(("registry_path", registry_path))
		.merge(("upstream_timeout_secs", 5))
		.merge(("log_level", "off"))
}

pub async fn client(figment: Figment) -> Client {
	Client::tracked(crate::build_rocket(figment)).await.unwrap()
}

/// A client already holding an operator session cookie, using the default account.
pub async fn logged_in_client(figment: Figment) -> Client {
	let client = client(figment).await;
	let response = client.post("/api/login")
		.json(&json!({"username": "admin", "password": "admin"}))
		.dispatch()
		.await;
	assert_eq!(response.status(), rocket::http::Status::Ok);
	drop(response);
	client
}
