//! Generate CRD YAML from Rust types.
//!
//! Usage:
//!   cargo run --bin crdgen                        # all CRDs to stdout
//!   cargo run --bin crdgen -- --out-dir ./crds    # one file per CRD

use std::path::PathBuf;

use alameda_operator::crd::{
    alameda_recommendation::AlamedaRecommendation, alameda_scaler::AlamedaScaler,
};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let out_dir: Option<PathBuf> = std::env::args()
        .skip_while(|a| a != "--out-dir")
        .nth(1)
        .map(PathBuf::from);

    let crds = [
        (
            "alamedascaler-crd.yaml",
            serde_yaml::to_string(&AlamedaScaler::crd())?,
        ),
        (
            "alamedarecommendation-crd.yaml",
            serde_yaml::to_string(&AlamedaRecommendation::crd())?,
        ),
    ];

    match out_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            for (name, yaml) in &crds {
                let path = dir.join(name);
                std::fs::write(&path, format!("---\n{yaml}"))?;
                eprintln!("wrote {}", path.display());
            }
        }
        None => {
            for (_name, yaml) in &crds {
                println!("---\n{yaml}");
            }
        }
    }
    Ok(())
}
