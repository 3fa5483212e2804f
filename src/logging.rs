use crate::config::Environment;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default directives when `RUST_LOG` is unset.
fn default_filter(env: &Environment) -> &'static str {
    match env {
        Environment::Dev => "wedding_planner_backend=debug,tower_http=debug,sqlx=warn,info",
        Environment::Staging => "wedding_planner_backend=debug,tower_http=info,sqlx=warn,info",
        Environment::Prod => "wedding_planner_backend=info,tower_http=info,sqlx=warn,warn",
    }
}

pub fn init_logging(env: &Environment) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(env).into());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(env.is_dev())
        .with_line_number(env.is_dev());

    // Prompt/response audit lines are large; keep them machine-readable in prod
    if matches!(env, Environment::Prod) {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.pretty())
            .init();
    }

    tracing::info!("Logging initialized for {:?} environment", env);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filters_parse_and_quiet_sqlx() {
        for env in [Environment::Dev, Environment::Staging, Environment::Prod] {
            let directives = default_filter(&env);
            assert!(EnvFilter::try_new(directives).is_ok(), "{:?}", env);
            assert!(directives.contains("sqlx=warn"), "{:?}", env);
        }
    }
}
