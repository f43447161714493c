use serde_json::json;
use tracing::info;
use wirecall_session::{Endpoint, Fault};
use wirecall_shape::Shape;

use crate::cmd::ServeArgs;
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub async fn run(args: ServeArgs, _format: OutputFormat) -> CliResult<i32> {
    let endpoint = Endpoint::bind(&args.path).map_err(|err| session_error("bind failed", err))?;

    register_builtin_commands(&endpoint);

    if let Some(allowed) = args.allow_uids.clone() {
        endpoint.set_authorization_handler(move |admission| {
            let allowed = allowed.clone();
            async move {
                match admission.credentials {
                    Some(credentials) if allowed.contains(&credentials.uid) => Ok(()),
                    Some(credentials) => Err(Fault::new(
                        403,
                        format!("uid {} is not allowed", credentials.uid),
                    )),
                    None => Err(Fault::new(403, "peer credentials unavailable")),
                }
            }
        });
    }

    endpoint
        .start()
        .map_err(|err| session_error("start failed", err))?;
    info!(path = ?args.path, commands = ?endpoint.commands().names(), "serving");

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| crate::exit::io_error("signal handler setup failed", err))?;
    info!("shutting down");
    endpoint.close();

    Ok(SUCCESS)
}

fn register_builtin_commands(endpoint: &Endpoint) {
    endpoint.register("echo", Shape::anything(), |request, _connection| {
        let payload = request.payload().clone();
        async move { Ok(payload) }
    });

    endpoint.register("ping", Shape::anything(), |_request, _connection| async move {
        Ok(json!({"pong": true}))
    });
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use wirecall_session::{connect, TracingSink};

    use super::*;

    fn make_sock_path(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "wirecall-serve-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir.join("serve.sock")
    }

    #[tokio::test]
    async fn builtin_commands_answer() {
        let sock_path = make_sock_path("builtin");
        let endpoint = Endpoint::bind(&sock_path)
            .expect("endpoint should bind")
            .with_diagnostics(Arc::new(TracingSink));
        register_builtin_commands(&endpoint);
        endpoint.start().expect("endpoint should start");

        let client = connect(&sock_path).await.expect("client should connect");

        let pong = client
            .invoke_with_deadline("ping", json!({}), Some(Duration::from_secs(2)))
            .await
            .expect("invoke should queue")
            .wait()
            .await
            .expect("ping should succeed");
        assert_eq!(pong, json!({"pong": true}));

        let echoed = client
            .invoke_with_deadline("echo", json!({"text": "hi"}), Some(Duration::from_secs(2)))
            .await
            .expect("invoke should queue")
            .wait()
            .await
            .expect("echo should succeed");
        assert_eq!(echoed, json!({"text": "hi"}));

        if let Some(parent) = sock_path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }
}
