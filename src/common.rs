use std::collections::HashMap;



pub type CameraId = String;
pub type CameraMap = HashMap<CameraId, CameraRecord>;
pub type UserMap = HashMap<String, UserRecord>;

/// Name of the cookie carrying a session token, both for operators talking to the gateway
/// and for the gateway talking to a camera.
pub const SESSION_COOKIE: &str = "session-id";

#[derive(Clone)]
#[derive(Debug)]
#[derive(PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct CameraRecord {
	#[serde(default)]
	pub id: CameraId,
	#[serde(default)]
	pub name: String,
	#[serde(rename = "url")]
	pub base_url: String,
	#[serde(default)]
	pub username: String,
	#[serde(default)]
	pub password: String,
}

/// What the admin API hands out for a camera: everything but the password.
#[derive(Clone)]
#[derive(Debug)]
#[derive(Serialize, Deserialize)]
pub struct CameraSummary {
	pub id: CameraId,
	pub name: String,
	pub url: String,
	pub username: String,
}

impl From<&CameraRecord> for CameraSummary {
	fn from(camera: &CameraRecord) -> Self {
		CameraSummary {
			id: camera.id.clone(),
			name: camera.name.clone(),
			url: camera.base_url.clone(),
			username: camera.username.clone(),
		}
	}
}

#[derive(Clone)]
#[derive(Debug)]
#[derive(Serialize, Deserialize)]
pub struct UserRecord {
	pub username: String,
	/// bcrypt hash, salt included.
	pub password_hash: String,
}

/// Body of `POST /api/login`, on the gateway and on the cameras alike.
/// `remember` is a session lifetime in hours.
#[derive(Clone)]
#[derive(Debug)]
#[derive(Serialize, Deserialize)]
pub struct LoginRequest {
	pub username: String,
	pub password: String,
	#[serde(default)]
	pub remember: i64,
}

#[derive(Clone)]
#[derive(Debug)]
#[derive(Serialize, Deserialize)]
pub struct NewUser {
	pub username: String,
	pub password: String,
}
