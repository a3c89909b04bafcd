//! Run with: cargo run --package server --bin generate-types --features typescript

use std::fs;
use std::path::Path;

fn main() {
    println!("Generating TypeScript types...");

    let out_dir = Path::new("bindings");

    if let Err(e) = fs::create_dir_all(out_dir) {
        eprintln!("Failed to create output directory: {}", e);
        std::process::exit(1);
    }

    #[cfg(feature = "typescript")]
    {
        use ts_rs::TS;

        toolshed_core::PackageKind::export_all_to(out_dir).expect("Failed to export PackageKind");
        toolshed_core::CatalogEntry::export_all_to(out_dir)
            .expect("Failed to export CatalogEntry");
        toolshed_core::InstallStatus::export_all_to(out_dir)
            .expect("Failed to export InstallStatus");
        toolshed_core::InstalledRecord::export_all_to(out_dir)
            .expect("Failed to export InstalledRecord");
        toolshed_core::Identity::export_all_to(out_dir).expect("Failed to export Identity");

        events::ProgressEvent::export_all_to(out_dir).expect("Failed to export ProgressEvent");

        host::QueryOutcome::export_all_to(out_dir).expect("Failed to export QueryOutcome");

        orchestrator::InstallRequest::export_all_to(out_dir)
            .expect("Failed to export InstallRequest");
        orchestrator::SoftwareListing::export_all_to(out_dir)
            .expect("Failed to export SoftwareListing");
        orchestrator::CommandCheck::export_all_to(out_dir).expect("Failed to export CommandCheck");
        orchestrator::UpdateStatus::export_all_to(out_dir).expect("Failed to export UpdateStatus");
        orchestrator::ScanReport::export_all_to(out_dir).expect("Failed to export ScanReport");
    }

    println!("TypeScript types generated in {}", out_dir.display());
}
