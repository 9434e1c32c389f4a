use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, status, Responder};
use rocket::serde::json::{json, Json};

use log::{error, warn};

use crate::common::CameraId;



/// Failures of the camera session and stream relay path. Each one is scoped to the request
/// that triggered it.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
	#[error("camera {0} doesn't exist")]
	CameraNotFound(CameraId),

	#[error("camera {camera_id} has an invalid url {url:?}")]
	InvalidCameraUrl { camera_id: CameraId, url: String },

	#[error("failed to login to camera {camera_id}: {source}")]
	UpstreamAuthFailed {
		camera_id: CameraId,
		#[source]
		source: LoginFailure,
	},

	#[error("failed to connect to camera {camera_id}: {source}")]
	CameraUnreachable {
		camera_id: CameraId,
		#[source]
		source: reqwest::Error,
	},

	#[error("session for camera {0} is expired, request the playlist again")]
	SessionExpired(CameraId),
}

/// Why a camera login didn't yield a usable session.
#[derive(Debug, thiserror::Error)]
pub enum LoginFailure {
	#[error(transparent)]
	Http(#[from] reqwest::Error),

	#[error("camera returned an unusable session token {0:?}")]
	BadToken(String),
}

impl RelayError {
	pub fn status(&self) -> Status {
		match self {
			RelayError::CameraNotFound(_) => Status::NotFound,
			RelayError::InvalidCameraUrl { .. } => Status::BadRequest,
			RelayError::SessionExpired(_) => Status::Gone,
			RelayError::UpstreamAuthFailed { .. } | RelayError::CameraUnreachable { .. } => Status::BadGateway,
		}
	}
}

impl<'r> Responder<'r, 'static> for RelayError {
	fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
		let status = self.status();
		if status.class().is_server_error() {
			error!("{} {}: {}", request.method(), request.uri(), self);
		} else {
			warn!("{} {}: {}", request.method(), request.uri(), self);
		}
		error_body(status, self.to_string()).respond_to(request)
	}
}



/// Failures of the camera and user registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
	#[error("registry file error: {0}")]
	Io(#[from] std::io::Error),

	#[error("registry encoding error: {0}")]
	Yaml(#[from] serde_yaml::Error),

	#[error("invalid camera: {0}")]
	InvalidCamera(String),

	#[error("invalid user: {0}")]
	InvalidUser(String),

	#[error("user {0} already exists")]
	UserExists(String),

	#[error("{0} doesn't exist")]
	NotFound(String),

	#[error("password hashing failed: {0}")]
	Hash(String),
}

impl RegistryError {
	pub fn status(&self) -> Status {
		match self {
			RegistryError::Io(_) | RegistryError::Yaml(_) | RegistryError::Hash(_) => Status::InternalServerError,
			RegistryError::InvalidCamera(_) | RegistryError::InvalidUser(_) => Status::BadRequest,
			RegistryError::UserExists(_) => Status::Conflict,
			RegistryError::NotFound(_) => Status::NotFound,
		}
	}
}

impl<'r> Responder<'r, 'static> for RegistryError {
	fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
		let status = self.status();
		if status.class().is_server_error() {
			error!("{} {}: {}", request.method(), request.uri(), self);
		}
		error_body(status, self.to_string()).respond_to(request)
	}
}



pub fn error_body(status: Status, reason: String) -> status::Custom<Json<serde_json::Value>> {
	status::Custom(status, Json(json!({
		"status": "error",
		"reason": reason,
	})))
}
