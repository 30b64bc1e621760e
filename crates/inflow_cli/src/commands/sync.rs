//! The `sync` command: run the issue sync for one or more repositories.

use std::sync::Arc;

use chrono::Utc;
use console::{style, Term};
use sea_orm::{DatabaseConnection, EntityTrait, Set};
use uuid::Uuid;

use inflow::api::HttpGraphClient;
use inflow::classify::{ErrorCategory, ExceptionClassifier};
use inflow::limits::{RateLimitTracker, ScopePacer};
use inflow::sync::{sync_repo_issues, PaginationEngine, SyncOptions};
use inflow::{CancelFlag, Scope, ScopeActiveModel};

use crate::config::Config;
use crate::progress;

pub(crate) struct SyncArgs {
    pub scope: Uuid,
    pub repos: Vec<String>,
    pub page_size: Option<u32>,
    pub max_pages: Option<u32>,
    pub no_prune: bool,
}

pub(crate) async fn handle_sync(
    args: SyncArgs,
    config: &Config,
    db: &DatabaseConnection,
    cancel: CancelFlag,
) -> Result<(), Box<dyn std::error::Error>> {
    if config.scope(args.scope).is_none() {
        return Err(format!(
            "scope {} has no token configured; add a [[scopes]] entry to the config",
            args.scope
        )
        .into());
    }
    ensure_scope_registered(db, args.scope, config).await?;

    let client = HttpGraphClient::new(&config.api.endpoint, Arc::new(config.credentials()))?
        .with_pacer(ScopePacer::new(config.api.requests_per_second));
    let engine = PaginationEngine::new(
        Arc::new(client),
        Arc::new(RateLimitTracker::default()),
        Arc::new(ExceptionClassifier::new()),
    );

    let options = SyncOptions {
        page_size: args.page_size.unwrap_or(config.sync.page_size),
        max_pages: args.max_pages.unwrap_or(config.sync.max_pages),
        prune: !args.no_prune && config.sync.prune,
    };

    let is_tty = Term::stdout().is_term();
    let on_progress = progress::make_callback(is_tty);

    let mut had_failure = false;
    for repo in &args.repos {
        if cancel.is_cancelled() {
            eprintln!("shutdown requested, skipping remaining repositories");
            break;
        }
        let Some((owner, name)) = repo.split_once('/') else {
            eprintln!("{} {repo}: expected owner/name", style("✗").red());
            had_failure = true;
            continue;
        };

        let outcome = sync_repo_issues(
            db,
            &engine,
            args.scope,
            owner,
            name,
            &options,
            &cancel,
            Some(&on_progress),
        )
        .await?;

        println!(
            "{repo}: {} ({} pages, {} upserted, {} pruned)",
            outcome.termination, outcome.pages_processed, outcome.upserted, outcome.pruned
        );

        if let Some(failure) = &outcome.last_failure {
            match failure.category {
                // Bad credentials will fail every remaining repo too.
                ErrorCategory::AuthError => {
                    return Err(format!("authentication failed: {}", failure.message).into());
                }
                ErrorCategory::NotFound => {
                    eprintln!("  {} repository not found upstream", style("!").yellow());
                }
                _ => {
                    eprintln!("  {} {}", style("!").yellow(), failure.message);
                    had_failure = true;
                }
            }
        }
    }

    let counters = engine.classifier().counters().snapshot();
    if counters != Default::default() {
        tracing::info!(
            retryable = counters.retryable,
            rate_limited = counters.rate_limited,
            not_found = counters.not_found,
            auth_error = counters.auth_error,
            client_error = counters.client_error,
            unknown = counters.unknown,
            "error classification totals"
        );
    }

    if had_failure {
        return Err("one or more repositories did not sync cleanly".into());
    }
    Ok(())
}

/// Insert the scope row on first use so foreign data has an owner.
async fn ensure_scope_registered(
    db: &DatabaseConnection,
    scope: Uuid,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    if Scope::find_by_id(scope).one(db).await?.is_some() {
        return Ok(());
    }

    let name = config
        .scope(scope)
        .and_then(|s| s.name.clone())
        .unwrap_or_else(|| scope.to_string());
    let host = config
        .api
        .endpoint
        .split('/')
        .nth(2)
        .unwrap_or("unknown")
        .to_string();

    let model = ScopeActiveModel {
        id: Set(scope),
        name: Set(name),
        host: Set(host),
        suspended: Set(false),
        created_at: Set(Utc::now().into()),
    };
    Scope::insert(model).exec(db).await?;
    Ok(())
}
