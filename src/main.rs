#[macro_use] extern crate rocket;
#[macro_use] extern crate serde_derive;

use std::sync::Arc;

use clap::{Arg, ArgAction, Command};
use rocket::{Build, Request, Response, Rocket};
use rocket::fairing::{AdHoc, Fairing, Info, Kind};
use rocket::figment::Figment;
use rocket::figment::providers::{Format, Toml};
use rocket::fs::FileServer;
use rocket::http::Header;

use log::{debug, info, warn};

mod camera_auth;
mod common;
mod config;
mod error;
mod live_api;
mod operator;
mod registry;
mod rest_api;
mod session_cache;
mod stream_relay;
#[cfg(test)]
mod test_support;

use config::GatewayConfig;
use operator::OperatorSessions;
use registry::Registry;
use session_cache::SessionCache;



// Players may be served from another origin than the gateway.
pub struct Cors;

#[rocket::async_trait]
impl Fairing for Cors {
	fn info(&self) -> Info {
		Info {
			name: "Add CORS headers to responses",
			kind: Kind::Response
		}
	}

	async fn on_response<'r>(&self, _request: &'r Request<'_>, response: &mut Response<'r>) {
		response.set_header(Header::new("Access-Control-Allow-Origin", "*"));
		response.set_header(Header::new("Access-Control-Allow-Methods", "POST, GET, DELETE, OPTIONS"));
		response.set_header(Header::new("Access-Control-Allow-Headers", "*"));
	}
}



fn registry_stage() -> AdHoc {
	AdHoc::on_ignite("Registry", |rocket| async {
		let config = rocket.state::<GatewayConfig>().cloned().unwrap_or_default();
		let registry = Registry::open(config.registry_path.clone());
		rocket.manage(Arc::new(registry))
	})
}

fn static_files_stage() -> AdHoc {
	AdHoc::on_ignite("Static files", |rocket| async {
		let static_dir = rocket.state::<GatewayConfig>().and_then(|config| config.static_dir.clone());
		match static_dir {
			Some(dir) if dir.is_dir() => rocket.mount("/", FileServer::from(dir).rank(20)),
			Some(dir) => {
				warn!("Static directory {} doesn't exist, not serving files", dir.display());
				rocket
			},
			None => rocket,
		}
	})
}

/// Periodically drops expired camera and operator sessions until shutdown.
fn session_sweeper() -> AdHoc {
	AdHoc::on_liftoff("Session sweeper", |rocket| Box::pin(async move {
		let interval = rocket.state::<GatewayConfig>().cloned().unwrap_or_default().sweep_interval();
		let cameras = rocket.state::<Arc<SessionCache>>().cloned();
		let operators = rocket.state::<Arc<OperatorSessions>>().cloned();
		let mut shutdown = rocket.shutdown();

		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			loop {
				tokio::select! {
					_ = ticker.tick() => {},
					_ = &mut shutdown => break,
				}
				let camera_sessions = cameras.as_ref().map_or(0, |cache| cache.purge_expired());
				let operator_sessions = operators.as_ref().map_or(0, |sessions| sessions.purge_expired());
				if camera_sessions + operator_sessions > 0 {
					let remaining = cameras.as_ref().map_or(0, |cache| cache.len());
					debug!("Swept {} camera and {} operator sessions, {} camera sessions remain",
						camera_sessions, operator_sessions, remaining);
				}
			}
		});
	}))
}

pub fn build_rocket(figment: Figment) -> Rocket<Build> {
	rocket::custom(figment)
		.attach(AdHoc::config::<GatewayConfig>())
		.attach(registry_stage())
		.attach(live_api::stage())
		.attach(operator::stage())
		.attach(rest_api::stage())
		.attach(static_files_stage())
		.attach(session_sweeper())
		.attach(Cors)
}



#[rocket::main]
async fn main() -> anyhow::Result<()> {
	let matches = Command::new("nvr-gateway")
		.version(env!("CARGO_PKG_VERSION"))
		.about("NVR gateway relaying live HLS video from registered cameras.")
		.arg(
			Arg::new("config")
				.action(ArgAction::Append)	// Allow argument to be specified multiple times
				.short('c')
				.long("config")
				.help("TOML file with gateway and rocket config")
		)
		.arg(
			Arg::new("port")
				.short('p')
				.long("port")
				.value_parser(clap::value_parser!(u16))
				.help("Port to listen on")
		)
		.arg(
			Arg::new("registry")
				.short('r')
				.long("registry")
				.help("YAML file holding registered cameras and users")
		)
		.get_matches();

	let mut figment = rocket::Config::figment();
	if let Some(filenames) = matches.get_many::<String>("config") {
		for filename in filenames {
			figment = figment.merge(Toml::file(filename).nested());
		}
	}
	if let Some(port) = matches.get_one::<u16>("port") {
		figment = figment.merge(("port", *port));
	}
	if let Some(registry) = matches.get_one::<String>("registry") {
		figment = figment.merge(("registry_path", registry));
	}

	let rocket = build_rocket(figment).launch().await?;
	info!("Gateway on port {} shut down", rocket.config().port);

	anyhow::Ok(())
}
