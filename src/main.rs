//! `sitepush <site.json> <plan.json>`
//!
//! Uploads the files of the plan to the site and publishes its locks.
//! Exit status: 0 on success, 1 if the upload failed, 2 on usage errors.

use clap::Parser;
use sitepush::{logging, uploader_for, SiteConfig, UploadPlan};
use sitepush_core::{LogObserver, UploadContext};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// Push an upload plan to an update site.
#[derive(Debug, Parser)]
#[command(name = "sitepush", version, about = "Upload files to an update site over SCP")]
struct Cli {
    /// Site configuration (JSON)
    site: PathBuf,

    /// Upload plan (JSON)
    plan: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging("info");

    match run(&cli.site, &cli.plan) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            tracing::error!("{}", message);
            ExitCode::from(1)
        }
    }
}

fn run(site_path: &Path, plan_path: &Path) -> Result<(), String> {
    let site = SiteConfig::load(site_path).map_err(|e| e.to_string())?;
    let plan = UploadPlan::load(plan_path).map_err(|e| e.to_string())?;
    let locks = plan.locks.clone();
    let base_dir = plan_path.parent().unwrap_or_else(|| Path::new("."));
    let items = plan.into_items(base_dir).map_err(|e| e.to_string())?;

    tracing::info!(
        host = %site.scp.host,
        items = items.len(),
        locks = locks.len(),
        "starting upload"
    );

    let mut uploader = uploader_for(&site).map_err(|e| e.to_string())?;
    let context = UploadContext::new(Arc::new(LogObserver));
    if !uploader.login(&context) {
        return Err(format!("could not log in to {}", site.scp.address()));
    }

    let result = uploader.upload(&items, &locks, &context);
    uploader.logout();
    result.map_err(|e| e.to_string())?;

    if let Some(timestamp) = uploader.timestamp() {
        println!("{}", timestamp);
    }
    tracing::info!("upload finished");
    Ok(())
}
