use std::io;
use std::pin::Pin;
use std::sync::Arc;

use futures::TryStreamExt;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use url::Url;

use log::{debug, warn};

use crate::camera_auth::{camera_endpoint, CameraAuthenticator, CredentialStore};
use crate::common::{CameraRecord, SESSION_COOKIE};
use crate::error::RelayError;
use crate::session_cache::SessionCache;



/// Path the cameras use for segments inside their own playlists.
pub const NATIVE_STREAM_PATH: &str = "/live/stream";

/// The gateway's route for a camera's segments.
pub fn gateway_stream_path(camera_id: &str) -> String {
	format!("/cam/{}/live/stream", camera_id)
}

/// Points every segment reference in a camera playlist back at the gateway.
pub fn rewrite_playlist(body: &str, camera_id: &str) -> String {
	body.replace(NATIVE_STREAM_PATH, &gateway_stream_path(camera_id))
}

pub type SegmentBody = Pin<Box<dyn AsyncRead + Send>>;

/// A transport-stream segment on its way from a camera, not yet read.
pub struct Segment {
	pub body: SegmentBody,
}



/// Proxies HLS playlists and segments from the cameras, keeping one upstream session per
/// camera in the session cache.
pub struct StreamRelay {
	store: Arc<dyn CredentialStore>,
	sessions: Arc<SessionCache>,
	authenticator: CameraAuthenticator,
	client: reqwest::Client,
}

impl StreamRelay {
	pub fn new(
		store: Arc<dyn CredentialStore>,
		sessions: Arc<SessionCache>,
		authenticator: CameraAuthenticator,
		client: reqwest::Client,
	) -> Self {
		StreamRelay {
			store,
			sessions,
			authenticator,
			client,
		}
	}

	/// Fetches the camera's live playlist, logging in first if no session is cached, and
	/// returns it rewritten to route segments through the gateway.
	pub async fn relay_playlist(&self, camera_id: &str) -> Result<String, RelayError> {
		let camera = self.lookup(camera_id).await?;
		let token = match self.sessions.get(camera_id) {
			Some(token) => token,
			None => self.authenticator.authenticate(camera_id).await?,
		};

		let url = camera_endpoint(&camera, &["live", "playlist"])?;
		let response = self.fetch(&camera, url, &token).await?;
		let body = match response.bytes().await {
			Ok(body) => body,
			Err(source) => return Err(self.unreachable(&camera, source)),
		};

		Ok(rewrite_playlist(&String::from_utf8_lossy(&body), camera_id))
	}

	/// Opens a segment stream. Never logs in: a missing session means the browser has to
	/// fetch the playlist again.
	pub async fn relay_segment(&self, camera_id: &str, index: &str) -> Result<Segment, RelayError> {
		let camera = self.lookup(camera_id).await?;
		let token = self.sessions.get(camera_id)
			.ok_or_else(|| RelayError::SessionExpired(camera_id.to_owned()))?;

		let url = camera_endpoint(&camera, &["live", "stream", index])?;
		let response = self.fetch(&camera, url, &token).await?;

		let stream = response.bytes_stream()
			.map_err(|err| io::Error::new(io::ErrorKind::Other, err));
		Ok(Segment {
			body: Box::pin(StreamReader::new(stream)),
		})
	}

	async fn lookup(&self, camera_id: &str) -> Result<CameraRecord, RelayError> {
		self.store.lookup_camera(camera_id).await
			.ok_or_else(|| RelayError::CameraNotFound(camera_id.to_owned()))
	}

	async fn fetch(&self, camera: &CameraRecord, url: Url, token: &str) -> Result<reqwest::Response, RelayError> {
		debug!("Relaying {} for camera {}", url.path(), camera.id);
		self.client.get(url)
			.header(reqwest::header::COOKIE, format!("{}={}", SESSION_COOKIE, token))
			.send()
			.await
			.and_then(reqwest::Response::error_for_status)
			.map_err(|source| self.unreachable(camera, source))
	}

	/// The cached session may be what the camera refused, so it goes either way.
	fn unreachable(&self, camera: &CameraRecord, source: reqwest::Error) -> RelayError {
		self.sessions.invalidate(&camera.id);
		warn!("Camera {} failed: {}", camera.id, source);
		RelayError::CameraUnreachable {
			camera_id: camera.id.clone(),
			source,
		}
	}
}
