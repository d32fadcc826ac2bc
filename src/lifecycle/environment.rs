//! Hosting environment and content-root file providers

use crate::config::ConfigService;
use crate::dispose::{Disposable, Dispose};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

pub const APPLICATION_NAME_KEY: &str = "applicationName";
pub const ENVIRONMENT_KEY: &str = "environment";
pub const CONTENT_ROOT_KEY: &str = "contentRoot";

pub const DEFAULT_ENVIRONMENT: &str = "Production";

/// Read access to files under a root directory
pub trait FileProvider: Send + Sync + 'static {
    fn root(&self) -> &Path;

    /// Whether `subpath` exists below the root.
    fn exists(&self, subpath: &str) -> bool {
        self.root().join(subpath).exists()
    }

    /// How the host should release this provider at shutdown.
    fn disposal(self: Arc<Self>) -> Disposable {
        Disposable::Inert
    }
}

/// File provider over a directory on the local file system
pub struct PhysicalFileProvider {
    root: PathBuf,
    disposed: AtomicBool,
}

impl PhysicalFileProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl FileProvider for PhysicalFileProvider {
    fn root(&self) -> &Path {
        &self.root
    }

    fn exists(&self, subpath: &str) -> bool {
        !self.is_disposed() && self.root.join(subpath).exists()
    }

    fn disposal(self: Arc<Self>) -> Disposable {
        Disposable::from_sync(self)
    }
}

impl Dispose for PhysicalFileProvider {
    fn dispose(&self) -> anyhow::Result<()> {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            tracing::debug!("Released file provider rooted at {}", self.root.display());
        }
        Ok(())
    }
}

/// Where and as what the application is running
pub struct HostEnvironment {
    application_name: String,
    environment_name: String,
    content_root_path: PathBuf,
    content_root_provider: RwLock<Arc<dyn FileProvider>>,
}

impl HostEnvironment {
    pub fn new(
        application_name: impl Into<String>,
        environment_name: impl Into<String>,
        content_root_path: impl Into<PathBuf>,
    ) -> Self {
        let content_root_path = content_root_path.into();
        let provider: Arc<dyn FileProvider> =
            Arc::new(PhysicalFileProvider::new(content_root_path.clone()));
        Self {
            application_name: application_name.into(),
            environment_name: environment_name.into(),
            content_root_path,
            content_root_provider: RwLock::new(provider),
        }
    }

    /// Reads `applicationName`, `environment` and `contentRoot`, falling back
    /// to the crate name, `Production` and the working directory.
    pub fn from_config(config: &ConfigService) -> Self {
        let application_name = config
            .get(APPLICATION_NAME_KEY)
            .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());
        let environment_name = config
            .get(ENVIRONMENT_KEY)
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());
        let content_root_path = config
            .get(CONTENT_ROOT_KEY)
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        Self::new(application_name, environment_name, content_root_path)
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    pub fn set_application_name(&mut self, name: impl Into<String>) {
        self.application_name = name.into();
    }

    pub fn environment_name(&self) -> &str {
        &self.environment_name
    }

    pub fn set_environment_name(&mut self, name: impl Into<String>) {
        self.environment_name = name.into();
    }

    pub fn is_development(&self) -> bool {
        self.environment_name.eq_ignore_ascii_case("Development")
    }

    pub fn is_production(&self) -> bool {
        self.environment_name.eq_ignore_ascii_case(DEFAULT_ENVIRONMENT)
    }

    pub fn content_root_path(&self) -> &Path {
        &self.content_root_path
    }

    pub fn content_root_provider(&self) -> Arc<dyn FileProvider> {
        Arc::clone(
            &self
                .content_root_provider
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    pub fn set_content_root_provider(&self, provider: Arc<dyn FileProvider>) {
        *self
            .content_root_provider
            .write()
            .unwrap_or_else(PoisonError::into_inner) = provider;
    }

    /// Providers to release at shutdown: the current one, plus `original`
    /// when it has been replaced by a different instance.
    pub(crate) fn provider_disposals(
        &self,
        original: &Arc<dyn FileProvider>,
    ) -> Vec<(Cow<'static, str>, Disposable)> {
        let current = self.content_root_provider();
        let replaced = !std::ptr::addr_eq(Arc::as_ptr(&current), Arc::as_ptr(original));

        let mut disposals = vec![(Cow::Borrowed("content root provider"), current.disposal())];
        if replaced {
            disposals.push((
                Cow::Borrowed("default content root provider"),
                Arc::clone(original).disposal(),
            ));
        }
        disposals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let config = ConfigService::from_pairs([
            (APPLICATION_NAME_KEY, "inventory"),
            (ENVIRONMENT_KEY, "development"),
            (CONTENT_ROOT_KEY, "/srv/inventory"),
        ]);
        let environment = HostEnvironment::from_config(&config);

        assert_eq!(environment.application_name(), "inventory");
        assert!(environment.is_development());
        assert!(!environment.is_production());
        assert_eq!(environment.content_root_path(), Path::new("/srv/inventory"));
        assert_eq!(
            environment.content_root_provider().root(),
            Path::new("/srv/inventory")
        );
    }

    #[test]
    fn test_defaults() {
        let environment = HostEnvironment::from_config(&ConfigService::empty());
        assert!(environment.is_production());
        assert_eq!(environment.application_name(), env!("CARGO_PKG_NAME"));
    }

    #[test]
    fn test_unreplaced_provider_is_disposed_once() {
        let environment = HostEnvironment::new("app", "Production", "/tmp");
        let original = environment.content_root_provider();

        let disposals = environment.provider_disposals(&original);
        assert_eq!(disposals.len(), 1);
        assert!(matches!(disposals[0].1, Disposable::Sync(_)));
    }

    #[test]
    fn test_replaced_provider_disposes_both() {
        let environment = HostEnvironment::new("app", "Production", "/tmp");
        let original = environment.content_root_provider();

        // Same root, different instance: identity decides, not equality.
        environment.set_content_root_provider(Arc::new(PhysicalFileProvider::new("/tmp")));

        let disposals = environment.provider_disposals(&original);
        let labels: Vec<_> = disposals.iter().map(|(label, _)| label.as_ref()).collect();
        assert_eq!(
            labels,
            vec!["content root provider", "default content root provider"]
        );
    }

    #[tokio::test]
    async fn test_physical_provider_dispose() {
        let provider = Arc::new(PhysicalFileProvider::new(std::env::temp_dir()));
        let disposal = Arc::clone(&provider).disposal();

        assert!(!provider.is_disposed());
        disposal.release().await.unwrap();
        disposal.release().await.unwrap();
        assert!(provider.is_disposed());
        assert!(!provider.exists("."));
    }
}
