use std::sync::Arc;

use rocket::http::Status;
use rocket::serde::json::{json, Json, Value};
use rocket::State;

use log::info;

use crate::common::{CameraRecord, CameraSummary};
use crate::error::RegistryError;
use crate::operator::Operator;
use crate::registry::Registry;
use crate::session_cache::SessionCache;



#[get("/")]
async fn list_cameras(_operator: Operator, registry: &State<Arc<Registry>>) -> Json<Vec<CameraSummary>> {
	let cameras = registry.list_cameras().await;
	Json(cameras.iter().map(CameraSummary::from).collect())
}

#[get("/<id>")]
async fn get_camera(_operator: Operator, id: &str, registry: &State<Arc<Registry>>) -> Option<Json<CameraSummary>> {
	registry.get_camera(id).await.map(|camera| {
		Json(CameraSummary::from(&camera))
	})
}

/// Creates or replaces a camera. The stored credentials may have changed, so any cached
/// session for it is dropped.
#[post("/", data = "<camera_json>")]
async fn save_camera(
	operator: Operator,
	camera_json: Json<CameraRecord>,
	registry: &State<Arc<Registry>>,
	sessions: &State<Arc<SessionCache>>,
) -> Result<Json<CameraSummary>, RegistryError> {
	let camera = registry.save_camera(camera_json.into_inner()).await?;
	sessions.invalidate(&camera.id);
	info!("Operator {} saved camera {}", operator.username, camera.id);
	Ok(Json(CameraSummary::from(&camera)))
}

#[delete("/<id>")]
async fn delete_camera(
	operator: Operator,
	id: &str,
	registry: &State<Arc<Registry>>,
	sessions: &State<Arc<SessionCache>>,
) -> Result<Status, RegistryError> {
	registry.delete_camera(id).await?;
	sessions.invalidate(id);
	info!("Operator {} deleted camera {}", operator.username, id);
	Ok(Status::NoContent)
}

#[catch(404)]
fn not_found() -> Value {
	json!({
		"status": "error",
		"reason": "Resource was not found."
	})
}

#[catch(401)]
fn unauthorized() -> Value {
	json!({
		"status": "error",
		"reason": "Session is not exist or has been expired."
	})
}



pub fn stage() -> rocket::fairing::AdHoc {
	rocket::fairing::AdHoc::on_ignite("Camera API", |rocket| async {
		rocket
			.register("/", catchers![not_found, unauthorized])
			.mount("/api/camera", routes![list_cameras, get_camera, save_camera, delete_camera])
	})
}
