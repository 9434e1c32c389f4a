use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use url::Url;

use crate::common::{CameraRecord, LoginRequest};
use crate::error::{LoginFailure, RelayError};
use crate::session_cache::SessionCache;



/// Read-only view of the registered cameras.
#[rocket::async_trait]
pub trait CredentialStore: Send + Sync {
	async fn lookup_camera(&self, id: &str) -> Option<CameraRecord>;
}

/// Builds `{base_url}/{segments...}` for a camera, refusing anything that isn't an absolute
/// URL with a host.
pub fn camera_endpoint(camera: &CameraRecord, segments: &[&str]) -> Result<Url, RelayError> {
	let invalid = || RelayError::InvalidCameraUrl {
		camera_id: camera.id.clone(),
		url: camera.base_url.clone(),
	};

	let mut url = Url::parse(&camera.base_url).map_err(|_| invalid())?;
	if url.host_str().map_or(true, str::is_empty) {
		return Err(invalid());
	}
	url.set_query(None);
	url.set_fragment(None);
	url.path_segments_mut()
		.map_err(|_| invalid())?
		.pop_if_empty()
		.extend(segments);
	Ok(url)
}

pub fn upstream_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
	reqwest::Client::builder()
		.timeout(timeout)
		.build()
}



/// Trades stored camera credentials for an upstream session token.
pub struct CameraAuthenticator {
	store: Arc<dyn CredentialStore>,
	sessions: Arc<SessionCache>,
	client: reqwest::Client,
	session_ttl: Duration,
}

impl CameraAuthenticator {
	/// `session_ttl` is both the cache lifetime and, in whole hours, the `remember` sent to
	/// the camera.
	pub fn new(
		store: Arc<dyn CredentialStore>,
		sessions: Arc<SessionCache>,
		client: reqwest::Client,
		session_ttl: Duration,
	) -> Self {
		CameraAuthenticator {
			store,
			sessions,
			client,
			session_ttl,
		}
	}

	pub async fn authenticate(&self, camera_id: &str) -> Result<String, RelayError> {
		let camera = self.store.lookup_camera(camera_id).await
			.ok_or_else(|| RelayError::CameraNotFound(camera_id.to_owned()))?;
		self.login(&camera).await
	}

	/// Writes the session cache only on success.
	async fn login(&self, camera: &CameraRecord) -> Result<String, RelayError> {
		let url = camera_endpoint(camera, &["api", "login"])?;
		let auth_failed = |source: LoginFailure| RelayError::UpstreamAuthFailed {
			camera_id: camera.id.clone(),
			source,
		};

		let request = LoginRequest {
			username: camera.username.clone(),
			password: camera.password.clone(),
			remember: i64::try_from(self.session_ttl.as_secs().div_ceil(3600)).unwrap_or(i64::MAX),
		};

		debug!("Logging in to camera {} at {}", camera.id, url);
		let response = self.client.post(url)
			.json(&request)
			.send()
			.await
			.and_then(reqwest::Response::error_for_status)
			.map_err(|err| auth_failed(err.into()))?;
		let body = response.text().await.map_err(|err| auth_failed(err.into()))?;

		let token = body.trim();
		if !is_cookie_value(token) {
			return Err(auth_failed(LoginFailure::BadToken(body)));
		}

		self.sessions.set(&camera.id, token.to_owned(), self.session_ttl);
		info!("Logged in to camera {}", camera.id);
		Ok(token.to_owned())
	}
}

/// Non-empty and made of cookie-octets only, so it can go into a `Cookie` header as is.
fn is_cookie_value(token: &str) -> bool {
	!token.is_empty()
		&& token.bytes().all(|b| matches!(b, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E))
}
