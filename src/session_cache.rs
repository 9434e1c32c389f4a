use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use log::debug;

use crate::common::CameraId;



/// An upstream session token issued by a camera's own login endpoint.
#[derive(Clone)]
#[derive(Debug)]
pub struct CameraSession {
	pub camera_id: CameraId,
	pub token: String,
	pub expires_at: Instant,
}

impl CameraSession {
	fn is_expired(&self, now: Instant) -> bool {
		now >= self.expires_at
	}
}

/// Camera ID to session token, at most one live entry per camera.
///
/// Each call is atomic on its own. Callers that check, log in and then store are not
/// serialized against each other, so two cold requests for one camera may both log in; the
/// later `set` wins.
#[derive(Debug)]
#[derive(Default)]
pub struct SessionCache {
	sessions: DashMap<CameraId, CameraSession>,
}

impl SessionCache {
	pub fn new() -> Self {
		SessionCache {
			sessions: DashMap::new(),
		}
	}

	/// Returns the token for `camera_id` unless it is missing or expired. Expired entries are
	/// dropped on the way out.
	pub fn get(&self, camera_id: &str) -> Option<String> {
		let now = Instant::now();
		{
			let session = self.sessions.get(camera_id)?;
			if !session.is_expired(now) {
				return Some(session.token.clone());
			}
		}
		self.sessions.remove_if(camera_id, |_, session| session.is_expired(now));
		None
	}

	/// Stores a session, replacing whatever was cached for the camera.
	pub fn set(&self, camera_id: &str, token: String, ttl: Duration) {
		let session = CameraSession {
			camera_id: camera_id.to_owned(),
			token,
			expires_at: Instant::now() + ttl,
		};
		self.sessions.insert(camera_id.to_owned(), session);
	}

	/// Returns whether a session was cached.
	pub fn invalidate(&self, camera_id: &str) -> bool {
		let removed = self.sessions.remove(camera_id).is_some();
		if removed {
			debug!("Invalidated session for camera {}", camera_id);
		}
		removed
	}

	/// Drops every expired session and returns how many went.
	pub fn purge_expired(&self) -> usize {
		let now = Instant::now();
		let before = self.sessions.len();
		self.sessions.retain(|_, session| {
			let expired = session.is_expired(now);
			if expired {
				debug!("Session for camera {} expired", session.camera_id);
			}
			!expired
		});
		before.saturating_sub(self.sessions.len())
	}

	pub fn len(&self) -> usize {
		self.sessions.len()
	}
}



#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;

	const TTL: Duration = Duration::from_secs(3600);
	const EPSILON: Duration = Duration::from_millis(1);

	#[tokio::test(start_paused = true)]
	async fn session_lives_until_ttl() {
		let cache = SessionCache::new();
		cache.set("cam1", "token-a".into(), TTL);

		tokio::time::advance(TTL - EPSILON).await;
		assert_eq!(cache.get("cam1").as_deref(), Some("token-a"));

		tokio::time::advance(EPSILON * 2).await;
		assert_eq!(cache.get("cam1"), None);
		assert_eq!(cache.len(), 0, "expired entry should be dropped by get");
	}

	#[tokio::test(start_paused = true)]
	async fn set_replaces_the_previous_session() {
		let cache = SessionCache::new();
		cache.set("cam1", "old".into(), TTL);
		tokio::time::advance(TTL / 2).await;
		cache.set("cam1", "new".into(), TTL);

		tokio::time::advance(TTL / 2 + EPSILON).await;
		assert_eq!(cache.get("cam1").as_deref(), Some("new"));
		assert_eq!(cache.len(), 1);
	}

	#[test]
	fn invalidate_reports_whether_anything_was_cached() {
		let cache = SessionCache::new();
		assert!(!cache.invalidate("cam1"));

		cache.set("cam1", "token".into(), TTL);
		cache.set("cam2", "other".into(), TTL);
		assert!(cache.invalidate("cam1"));
		assert_eq!(cache.get("cam1"), None);
		assert_eq!(cache.get("cam2").as_deref(), Some("other"));
	}

	#[tokio::test(start_paused = true)]
	async fn purge_drops_only_expired_sessions() {
		let cache = SessionCache::new();
		cache.set("short", "a".into(), Duration::from_secs(10));
		cache.set("long", "b".into(), TTL);

		tokio::time::advance(Duration::from_secs(11)).await;
		assert_eq!(cache.purge_expired(), 1);
		assert_eq!(cache.len(), 1);
		assert_eq!(cache.get("long").as_deref(), Some("b"));
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_logins_leave_one_entry() {
		let cache = Arc::new(SessionCache::new());
		let tasks: Vec<_> = (0..32)
			.map(|i| {
				let cache = cache.clone();
				tokio::spawn(async move {
					cache.set("cam1", format!("token-{}", i), TTL);
					cache.get("cam1")
				})
			})
			.collect();

		for task in tasks {
			assert!(task.await.unwrap().is_some());
		}
		assert_eq!(cache.len(), 1);
	}
}
