use crate::error::ConfigError;
use crate::format::FormatSpec;
use crate::path_mirror::SourceFilter;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_RENDER_INTERVAL: Duration = Duration::from_millis(200);

/// Everything one conversion run needs.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub source_root: PathBuf,
    pub dest_root: PathBuf,
    pub format: FormatSpec,
    pub parallelism: usize,
    pub render_interval: Duration,
    pub filter: SourceFilter,
    pub copy_artwork: bool,
}

impl RunConfig {
    pub fn new(
        source_root: impl Into<PathBuf>,
        dest_root: impl Into<PathBuf>,
        format: FormatSpec,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            dest_root: dest_root.into(),
            format,
            parallelism: shared_utils::default_parallelism(),
            render_interval: DEFAULT_RENDER_INTERVAL,
            filter: SourceFilter::default(),
            copy_artwork: false,
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_render_interval(mut self, interval: Duration) -> Self {
        self.render_interval = interval;
        self
    }

    pub fn with_filter(mut self, filter: SourceFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_artwork(mut self, copy_artwork: bool) -> Self {
        self.copy_artwork = copy_artwork;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parallelism == 0 {
            return Err(ConfigError::ZeroParallelism);
        }
        if self.render_interval.is_zero() {
            return Err(ConfigError::ZeroRenderInterval);
        }
        if matches!(&self.format.quality, Some(q) if q.trim().is_empty()) {
            return Err(ConfigError::EmptyQuality);
        }
        Ok(())
    }
}
