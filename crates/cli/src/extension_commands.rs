use std::sync::Arc;

use {
    clap::Subcommand,
    parabox_config::ParaboxConfig,
    parabox_extension::{BuiltInRegistry, DefaultLoader, ExtensionLoader, Provenance},
};

#[derive(Subcommand)]
pub enum ExtensionAction {
    /// Scan built-ins and installed packages.
    List {
        /// Print descriptors and errors as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Loader over the built-in extensions and the configured search paths.
pub fn build_loader(config: &ParaboxConfig) -> DefaultLoader {
    let mut builtins = BuiltInRegistry::new();
    parabox_onebot::register(&mut builtins);

    let loader = DefaultLoader::new(builtins)
        .with_search_paths(config.extension_search_paths())
        .with_min_lib_version(config.extensions.min_lib_version);

    if !config.extensions.native {
        return loader;
    }
    #[cfg(feature = "native")]
    {
        use parabox_extension::{CompositeResolver, NativeClassResolver};
        let resolver = CompositeResolver::new().push(Arc::new(NativeClassResolver::new(
            config.extensions.min_lib_version,
        )));
        loader.with_resolver(Arc::new(resolver))
    }
    #[cfg(not(feature = "native"))]
    {
        tracing::warn!("extensions.native is set but this build has no native loader");
        loader
    }
}

pub async fn handle_extensions(action: ExtensionAction, config: &ParaboxConfig) -> anyhow::Result<()> {
    match action {
        ExtensionAction::List { json } => {
            let loader: Arc<dyn ExtensionLoader> = Arc::new(build_loader(config));
            let results = loader.scan_all().await;

            if json {
                let entries: Vec<serde_json::Value> = results
                    .iter()
                    .map(|result| match result {
                        Ok(descriptor) => serde_json::to_value(descriptor)
                            .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() })),
                        Err(e) => serde_json::json!({ "error": e.to_string() }),
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }

            if results.is_empty() {
                println!("No extensions found.");
                return Ok(());
            }
            for result in results {
                match result {
                    Ok(descriptor) => {
                        let origin = match &descriptor.provenance {
                            Provenance::BuiltIn => "built-in".to_string(),
                            Provenance::External(package) => {
                                format!("{} {}", package.package, package.version)
                            },
                        };
                        println!("  {:<40} {} ({origin})", descriptor.key, descriptor.name);
                    },
                    Err(e) => println!("  error: {e}"),
                }
            }
        },
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loader_always_offers_onebot() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ParaboxConfig::default();
        config.extensions.search_paths = vec![dir.path().to_path_buf()];

        let results = build_loader(&config).scan_all().await;
        assert_eq!(results.len(), 1);
        let descriptor = results[0].as_ref().unwrap();
        assert_eq!(descriptor.key, parabox_onebot::EXTENSION_KEY);
        assert_eq!(descriptor.provenance, Provenance::BuiltIn);
    }
}
