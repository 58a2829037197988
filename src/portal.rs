// portal.rs

use askama::Template;
use axum::{
    body::Body,
    extract::{Form, State},
    http::{header, Response, StatusCode},
    response::IntoResponse,
    routing::*,
    Router,
};
pub use axum_macros::debug_handler;
use log::*;

use crate::*;

pub const RESTART_DELAY: Duration = Duration::from_secs(5);

const DEFAULT_PORTAL_PORT: u16 = 80;
const RESTART_MSG: &str = "OK, restarting in 5 seconds...";

#[derive(Debug, Default, Deserialize)]
pub struct ConfigForm {
    pub ssid: Option<String>,
    pub pass: Option<String>,
    pub api_key: Option<String>,
    pub channel_id: Option<String>,
    pub text: Option<String>,
}

impl MyConfig {
    pub fn apply_form(&mut self, form: ConfigForm) {
        let fields = [
            (&mut self.ssid, form.ssid),
            (&mut self.pass, form.pass),
            (&mut self.api_key, form.api_key),
            (&mut self.channel_id, form.channel_id),
            (&mut self.text, form.text),
        ];
        for (field, value) in fields {
            if let Some(v) = value {
                *field = v;
            }
        }
    }
}

#[derive(Debug)]
pub enum PortalRequest {
    Show,
    Submit(ConfigForm),
}

#[derive(Debug, PartialEq, Eq)]
pub struct PortalResponse {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: String,
}

impl IntoResponse for PortalResponse {
    fn into_response(self) -> Response<Body> {
        (
            self.status,
            [(header::CONTENT_TYPE, self.content_type)],
            self.body,
        )
            .into_response()
    }
}

/// The portal's behavior, free of any I/O. A returned config is to be
/// persisted, followed by a restart.
pub fn handle_request(
    config: &MyConfig,
    request: PortalRequest,
) -> (PortalResponse, Option<MyConfig>) {
    match request {
        PortalRequest::Show => match config.render() {
            Ok(html) => (
                PortalResponse {
                    status: StatusCode::OK,
                    content_type: "text/html; charset=utf-8",
                    body: html,
                },
                None,
            ),
            Err(e) => {
                let err_msg = format!("Index template error: {e:?}\n");
                error!("{err_msg}");
                (
                    PortalResponse {
                        status: StatusCode::INTERNAL_SERVER_ERROR,
                        content_type: "text/plain; charset=utf-8",
                        body: err_msg,
                    },
                    None,
                )
            }
        },
        PortalRequest::Submit(form) => {
            let mut new_config = config.clone();
            new_config.apply_form(form);
            info!("Got config:\n{new_config:#?}");
            (
                PortalResponse {
                    status: StatusCode::OK,
                    content_type: "text/plain; charset=utf-8",
                    body: RESTART_MSG.to_string(),
                },
                Some(new_config),
            )
        }
    }
}

pub fn portal_port() -> u16 {
    option_env!("API_PORT")
        .unwrap_or("-")
        .parse()
        .unwrap_or(DEFAULT_PORTAL_PORT)
}

pub fn portal_router(state: Arc<Pin<Box<MyState>>>) -> Router {
    Router::new()
        .route("/", get(get_index).post(post_index))
        .with_state(state)
}

pub async fn run_portal(state: Arc<Pin<Box<MyState>>>) -> anyhow::Result<()> {
    // serve only once there is a network to serve on
    loop {
        if state.connectivity.read().await.portal_addr().is_some() {
            break;
        }
        sleep(Duration::from_secs(1)).await;
    }

    let listen = format!("0.0.0.0:{}", portal_port());
    let addr = listen.parse::<net::SocketAddr>()?;

    let app = portal_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Config portal listening to {listen}");
    Ok(axum::serve(listener, app.into_make_service()).await?)
}

#[debug_handler]
pub async fn get_index(State(state): State<Arc<Pin<Box<MyState>>>>) -> PortalResponse {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} get_index()");

    let config = state.config.read().await;
    handle_request(&config, PortalRequest::Show).0
}

#[debug_handler]
pub async fn post_index(
    State(state): State<Arc<Pin<Box<MyState>>>>,
    Form(form): Form<ConfigForm>,
) -> PortalResponse {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} post_index()");

    let (response, new_config) = {
        let config = state.config.read().await;
        handle_request(&config, PortalRequest::Submit(form))
    };
    match new_config {
        Some(config) => Box::pin(save_conf(state, config, response)).await,
        None => response,
    }
}

async fn save_conf(
    state: Arc<Pin<Box<MyState>>>,
    config: MyConfig,
    ok_response: PortalResponse,
) -> PortalResponse {
    info!("Saving new config to nvs...");
    let res = state.store.write().await.save(&config);
    match res {
        Ok(_) => {
            info!("Config saved to nvs. Resetting soon...");
            *state.config.write().await = config;
            *state.reset.write().await = true;
            ok_response
        }
        Err(e) => {
            let msg = format!("Nvs write error: {e:?}");
            error!("{}", msg);
            PortalResponse {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                content_type: "text/plain; charset=utf-8",
                body: msg,
            }
        }
    }
}


// EOF
