use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use rocket::fairing::AdHoc;
use rocket::http::{Cookie, CookieJar, Status};
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest, Request};
use rocket::serde::json::{json, Json, Value};
use rocket::State;
use tokio::time::Instant;

use log::{info, warn};

use crate::common::{LoginRequest, NewUser, SESSION_COOKIE};
use crate::config::{self, GatewayConfig};
use crate::error::RegistryError;
use crate::registry::Registry;



const DEFAULT_USERNAME: &str = "admin";
const DEFAULT_PASSWORD: &str = "admin";

#[derive(Debug)]
struct OperatorSession {
	username: String,
	expires_at: Instant,
}

/// Logged-in operators, by session ID.
#[derive(Debug)]
#[derive(Default)]
pub struct OperatorSessions {
	sessions: DashMap<String, OperatorSession>,
}

impl OperatorSessions {
	pub fn new() -> Self {
		OperatorSessions {
			sessions: DashMap::new(),
		}
	}

	/// Opens a session and returns its ID.
	pub fn create(&self, username: &str, ttl: Duration) -> String {
		let id: String = rand::thread_rng()
			.sample_iter(&Alphanumeric)
			.take(32)
			.map(char::from)
			.collect();
		let session = OperatorSession {
			username: username.to_owned(),
			expires_at: Instant::now() + ttl,
		};
		self.sessions.insert(id.clone(), session);
		id
	}

	/// Username behind a live session.
	pub fn get(&self, id: &str) -> Option<String> {
		let now = Instant::now();
		{
			let session = self.sessions.get(id)?;
			if now < session.expires_at {
				return Some(session.username.clone());
			}
		}
		self.sessions.remove_if(id, |_, session| now >= session.expires_at);
		None
	}

	pub fn remove(&self, id: &str) {
		self.sessions.remove(id);
	}

	/// Logs a user out everywhere. Returns how many sessions were closed.
	pub fn revoke_user(&self, username: &str) -> usize {
		let before = self.sessions.len();
		self.sessions.retain(|_, session| session.username != username);
		before.saturating_sub(self.sessions.len())
	}

	pub fn purge_expired(&self) -> usize {
		let now = Instant::now();
		let before = self.sessions.len();
		self.sessions.retain(|_, session| now < session.expires_at);
		before.saturating_sub(self.sessions.len())
	}
}



/// Request guard for anything behind the operator login.
#[derive(Debug)]
pub struct Operator {
	pub username: String,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Operator {
	type Error = &'static str;

	async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
		let Some(sessions) = request.rocket().state::<Arc<OperatorSessions>>() else {
			return Outcome::Error((Status::InternalServerError, "operator sessions are not configured"));
		};

		match request.cookies().get(SESSION_COOKIE) {
			None => Outcome::Error((Status::Unauthorized, "session is not exist")),
			Some(cookie) => match sessions.get(cookie.value()) {
				Some(username) => Outcome::Success(Operator { username }),
				None => Outcome::Error((Status::Unauthorized, "session has been expired")),
			},
		}
	}
}



#[post("/login", data = "<credentials>")]
async fn login(
	credentials: Json<LoginRequest>,
	registry: &State<Arc<Registry>>,
	sessions: &State<Arc<OperatorSessions>>,
	config: &State<GatewayConfig>,
	cookies: &CookieJar<'_>,
) -> Result<String, Status> {
	let credentials = credentials.into_inner();

	let accepted = if registry.has_users().await {
		registry.verify_user(&credentials.username, &credentials.password).await
	} else {
		credentials.username == DEFAULT_USERNAME && credentials.password == DEFAULT_PASSWORD
	};
	if !accepted {
		warn!("Rejected login for {}", credentials.username);
		return Err(Status::Unauthorized);
	}

	let ttl = match u32::try_from(credentials.remember) {
		Ok(hours) if hours > 0 => config::hours(hours),
		_ => config.operator_session_ttl(),
	};
	let session_id = sessions.create(&credentials.username, ttl);
	let max_age = rocket::time::Duration::seconds(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));
	cookies.add(Cookie::build((SESSION_COOKIE, session_id.clone())).path("/").max_age(max_age));

	info!("Operator {} logged in", credentials.username);
	Ok(session_id)
}

#[post("/logout")]
fn logout(sessions: &State<Arc<OperatorSessions>>, cookies: &CookieJar<'_>) -> Status {
	match cookies.get(SESSION_COOKIE) {
		Some(cookie) => {
			sessions.remove(cookie.value());
			cookies.remove(Cookie::build(SESSION_COOKIE).path("/"));
			Status::Ok
		},
		None => Status::Unauthorized,
	}
}

#[get("/user")]
async fn list_users(_operator: Operator, registry: &State<Arc<Registry>>) -> Json<Vec<String>> {
	Json(registry.list_users().await)
}

#[post("/user", data = "<user>")]
async fn insert_user(_operator: Operator, user: Json<NewUser>, registry: &State<Arc<Registry>>) -> Result<Status, RegistryError> {
	registry.insert_user(&user.username, &user.password).await?;
	Ok(Status::Created)
}

#[delete("/user/<username>")]
async fn delete_user(
	operator: Operator,
	username: &str,
	registry: &State<Arc<Registry>>,
	sessions: &State<Arc<OperatorSessions>>,
) -> Result<Status, RegistryError> {
	if !registry.delete_user(username).await? {
		return Err(RegistryError::NotFound(format!("user {}", username)));
	}
	let revoked = sessions.revoke_user(username);
	info!("Operator {} deleted user {}, closing {} sessions", operator.username, username, revoked);
	Ok(Status::NoContent)
}

#[get("/setting")]
async fn settings(_operator: Operator, registry: &State<Arc<Registry>>) -> Value {
	json!({
		"users": registry.list_users().await,
	})
}



pub fn stage() -> AdHoc {
	AdHoc::on_ignite("Operator sessions", |rocket| async {
		rocket
			.manage(Arc::new(OperatorSessions::new()))
			.mount("/api", routes![login, logout, list_users, insert_user, delete_user, settings])
	})
}



#[cfg(test)]
mod tests {
	use rocket::http::Status;
	use rocket::serde::json::json;

	use super::*;
	use crate::test_support::{client, figment, logged_in_client};

	#[tokio::test(start_paused = true)]
	async fn sessions_expire() {
		let sessions = OperatorSessions::new();
		let id = sessions.create("alice", Duration::from_secs(60));
		assert_eq!(sessions.get(&id).as_deref(), Some("alice"));

		tokio::time::advance(Duration::from_secs(61)).await;
		assert_eq!(sessions.get(&id), None);
		assert_eq!(sessions.purge_expired(), 0);
	}

	#[test]
	fn revoking_a_user_keeps_other_sessions() {
		let sessions = OperatorSessions::new();
		let alice = sessions.create("alice", Duration::from_secs(60));
		sessions.create("alice", Duration::from_secs(60));
		let bob = sessions.create("bob", Duration::from_secs(60));
		assert_ne!(alice, bob);

		assert_eq!(sessions.revoke_user("alice"), 2);
		assert_eq!(sessions.get(&alice), None);
		assert_eq!(sessions.get(&bob).as_deref(), Some("bob"));
	}

	#[rocket::async_test]
	async fn default_account_only_works_without_users() {
		let dir = tempfile::tempdir().unwrap();
		let client = logged_in_client(figment(dir.path(), &[])).await;

		let response = client.post("/api/user")
			.json(&json!({"username": "alice", "password": "hunter2"}))
			.dispatch()
			.await;
		assert_eq!(response.status(), Status::Created);

		let response = client.post("/api/login")
			.json(&json!({"username": "admin", "password": "admin"}))
			.dispatch()
			.await;
		assert_eq!(response.status(), Status::Unauthorized);

		let response = client.post("/api/login")
			.json(&json!({"username": "alice", "password": "hunter2", "remember": 12}))
			.dispatch()
			.await;
		assert_eq!(response.status(), Status::Ok);
		assert!(client.cookies().get(SESSION_COOKIE).is_some());
	}

	#[rocket::async_test]
	async fn admin_api_needs_a_session() {
		let dir = tempfile::tempdir().unwrap();
		let client = client(figment(dir.path(), &[])).await;

		let response = client.get("/api/user").dispatch().await;
		assert_eq!(response.status(), Status::Unauthorized);

		let response = client.get("/api/setting").dispatch().await;
		assert_eq!(response.status(), Status::Unauthorized);
	}

	#[rocket::async_test]
	async fn logout_ends_the_session() {
		let dir = tempfile::tempdir().unwrap();
		let client = logged_in_client(figment(dir.path(), &[])).await;
		assert_eq!(client.get("/api/user").dispatch().await.status(), Status::Ok);

		assert_eq!(client.post("/api/logout").dispatch().await.status(), Status::Ok);
		assert_eq!(client.get("/api/user").dispatch().await.status(), Status::Unauthorized);
	}

	#[rocket::async_test]
	async fn deleting_a_user_logs_them_out() {
		let dir = tempfile::tempdir().unwrap();
		let admin = logged_in_client(figment(dir.path(), &[])).await;
		admin.post("/api/user")
			.json(&json!({"username": "alice", "password": "hunter2"}))
			.dispatch()
			.await;

		let sessions = admin.rocket().state::<Arc<OperatorSessions>>().unwrap();
		let alice = sessions.create("alice", Duration::from_secs(60));

		let response = admin.delete("/api/user/alice").dispatch().await;
		assert_eq!(response.status(), Status::NoContent);
		assert_eq!(sessions.get(&alice), None);

		let response = admin.get("/api/setting").dispatch().await;
		assert_eq!(response.into_json::<serde_json::Value>().await.unwrap(), json!({"users": []}));
	}
}
