use std::io::Cursor;
use std::sync::Arc;

use rocket::fairing::AdHoc;
use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use rocket::State;

use log::{debug, error};

use crate::camera_auth::{upstream_client, CameraAuthenticator, CredentialStore};
use crate::config::GatewayConfig;
use crate::error::RelayError;
use crate::operator::Operator;
use crate::registry::Registry;
use crate::session_cache::SessionCache;
use crate::stream_relay::{Segment, StreamRelay};



const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

fn live_response<'r>() -> response::Builder<'r> {
	let mut builder = Response::build();
	builder
		.raw_header("Cache-Control", NO_CACHE)
		.raw_header("Pragma", "no-cache")
		.raw_header("Expires", "0")
		.raw_header("Access-Control-Allow-Origin", "*");
	builder
}

pub struct LivePlaylist(String);

impl<'r> Responder<'r, 'static> for LivePlaylist {
	fn respond_to(self, _request: &'r Request<'_>) -> response::Result<'static> {
		live_response()
			.header(ContentType::new("application", "x-mpegURL"))
			.sized_body(self.0.len(), Cursor::new(self.0))
			.ok()
	}
}

pub struct LiveSegment(Segment);

impl<'r> Responder<'r, 'static> for LiveSegment {
	fn respond_to(self, _request: &'r Request<'_>) -> response::Result<'static> {
		live_response()
			.header(ContentType::new("video", "MP2T"))
			.streamed_body(self.0.body)
			.ok()
	}
}



#[get("/<camera_id>/live/playlist")]
async fn live_playlist(
	operator: Operator,
	camera_id: &str,
	relay: &State<StreamRelay>,
) -> Result<LivePlaylist, RelayError> {
	debug!("Operator {} requested playlist of camera {}", operator.username, camera_id);
	relay.relay_playlist(camera_id).await.map(LivePlaylist)
}

#[get("/<camera_id>/live/stream/<index>")]
async fn live_segment(
	_operator: Operator,
	camera_id: &str,
	index: &str,
	relay: &State<StreamRelay>,
) -> Result<Result<LiveSegment, RelayError>, Status> {
	if index.is_empty() || index == "." || index == ".." {
		return Err(Status::NotFound);
	}
	Ok(relay.relay_segment(camera_id, index).await.map(LiveSegment))
}



/// Builds the camera session cache and the relay on top of the registry.
pub fn stage() -> AdHoc {
	AdHoc::try_on_ignite("Live stream relay", |rocket| async {
		let config = rocket.state::<GatewayConfig>().cloned().unwrap_or_default();
		let Some(registry) = rocket.state::<Arc<Registry>>().cloned() else {
			error!("Live stream relay needs the registry to be attached first");
			return Err(rocket);
		};

		let client = match upstream_client(config.upstream_timeout()) {
			Ok(client) => client,
			Err(err) => {
				error!("Failed to build upstream HTTP client; error was {}", err);
				return Err(rocket);
			}
		};

		let store: Arc<dyn CredentialStore> = registry;
		let sessions = Arc::new(SessionCache::new());
		let authenticator = CameraAuthenticator::new(
			store.clone(),
			sessions.clone(),
			client.clone(),
			config.camera_session_ttl(),
		);
		let relay = StreamRelay::new(store, sessions.clone(), authenticator, client);

		Ok(rocket
			.manage(sessions)
			.manage(relay)
			.mount("/cam", routes![live_playlist, live_segment]))
	})
}
