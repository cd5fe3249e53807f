//! JWalk-based source discovery.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use globset::{Glob, GlobSet, GlobSetBuilder};
use jwalk::{Parallelism, WalkDir};
use tracing::{debug, info, warn};

use kinship_core::{
    ExtensionSets, FileId, FileRecord, ScanConfig, ScanError, ScanWarning, WarningKind,
};

/// Result of walking the source roots.
#[derive(Debug, Clone)]
pub struct Discovery {
    /// Canonical roots that were walked.
    pub roots: Vec<PathBuf>,
    /// Regular files in discovery order; `records[i].id == FileId(i)`.
    pub records: Vec<FileRecord>,
    /// Non-fatal problems met along the way.
    pub warnings: Vec<ScanWarning>,
    /// Sum of record sizes in bytes.
    pub total_size: u64,
    /// Wall time spent walking.
    pub duration: Duration,
}

/// Scanner using jwalk for parallel traversal.
///
/// Entries are sorted by name within each directory and roots are walked in
/// the order given, so the same tree always yields the same FileIds.
#[derive(Debug, Default)]
pub struct JwalkScanner;

impl JwalkScanner {
    /// Create a new scanner.
    pub fn new() -> Self {
        Self
    }

    /// Walk every configured root.
    pub fn scan(
        &self,
        config: &ScanConfig,
        extensions: &ExtensionSets,
    ) -> Result<Discovery, ScanError> {
        let start = Instant::now();
        if config.roots.is_empty() {
            return Err(ScanError::NoRoots);
        }

        let ignore = build_ignore_set(&config.ignore_patterns)?;
        let mut roots = Vec::with_capacity(config.roots.len());
        for root in &config.roots {
            let canonical = root.canonicalize().map_err(|e| ScanError::io(root, e))?;
            if !roots.contains(&canonical) {
                roots.push(canonical);
            }
        }

        let mut collector = Collector {
            config,
            extensions,
            ignore: ignore.as_ref(),
            seen: HashSet::new(),
            records: Vec::new(),
            warnings: Vec::new(),
            total_size: 0,
        };

        for root in &roots {
            if root.is_file() {
                collector.visit_root_file(root);
            } else {
                collector.walk(root);
            }
        }

        let duration = start.elapsed();
        info!(
            roots = roots.len(),
            files = collector.records.len(),
            warnings = collector.warnings.len(),
            "discovery finished"
        );

        Ok(Discovery {
            roots,
            records: collector.records,
            warnings: collector.warnings,
            total_size: collector.total_size,
            duration,
        })
    }
}

fn build_ignore_set(patterns: &[String]) -> Result<Option<GlobSet>, ScanError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| ScanError::InvalidPattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map(Some)
        .map_err(|e| ScanError::InvalidPattern {
            pattern: patterns.join(", "),
            message: e.to_string(),
        })
}

/// Mutable state shared across roots.
struct Collector<'a> {
    config: &'a ScanConfig,
    extensions: &'a ExtensionSets,
    ignore: Option<&'a GlobSet>,
    seen: HashSet<PathBuf>,
    records: Vec<FileRecord>,
    warnings: Vec<ScanWarning>,
    total_size: u64,
}

impl Collector<'_> {
    fn walk(&mut self, root: &Path) {
        let parallelism = match self.config.threads {
            0 => Parallelism::RayonDefaultPool {
                busy_timeout: Duration::from_millis(100),
            },
            n => Parallelism::RayonNewPool(n),
        };

        let walker = WalkDir::new(root)
            .parallelism(parallelism)
            .skip_hidden(!self.config.include_hidden)
            .follow_links(self.config.follow_symlinks)
            .sort(true)
            .min_depth(1);

        for entry_result in walker {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    let path = err.path().map(|p| p.to_path_buf()).unwrap_or_default();
                    warn!(path = %path.display(), error = %err, "unreadable entry");
                    self.warnings
                        .push(ScanWarning::new(path, err.to_string(), WarningKind::ReadError));
                    continue;
                }
            };

            let path = entry.path();
            if self.is_ignored(root, &path) {
                continue;
            }

            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }
            if file_type.is_symlink() {
                if !path.exists() {
                    let target = std::fs::read_link(&path)
                        .map(|p| p.to_string_lossy().to_string())
                        .unwrap_or_default();
                    self.warnings.push(ScanWarning::new(
                        &path,
                        format!("Broken symlink: {} -> {target}", path.display()),
                        WarningKind::BrokenSymlink,
                    ));
                }
                continue;
            }

            match entry.metadata() {
                Ok(metadata) => self.admit(path, &metadata),
                Err(err) => {
                    self.warnings.push(ScanWarning::new(
                        &path,
                        err.to_string(),
                        WarningKind::MetadataError,
                    ));
                }
            }
        }
    }

    fn visit_root_file(&mut self, path: &Path) {
        match std::fs::metadata(path) {
            Ok(metadata) => self.admit(path.to_path_buf(), &metadata),
            Err(err) => self.warnings.push(ScanWarning::read_error(path, &err)),
        }
    }

    /// Match every component below the root, so ignored directories hide
    /// everything inside them.
    fn is_ignored(&self, root: &Path, path: &Path) -> bool {
        let Some(ignore) = self.ignore else {
            return false;
        };
        let relative = path.strip_prefix(root).unwrap_or(path);
        ignore.is_match(relative)
            || relative
                .components()
                .any(|c| ignore.is_match(Path::new(c.as_os_str())))
    }

    fn admit(&mut self, path: PathBuf, metadata: &std::fs::Metadata) {
        if !metadata.is_file() {
            return;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if self.config.should_skip_hidden(&name) {
            return;
        }

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if self.config.is_blocked(&extension) {
            debug!(path = %path.display(), "blocked extension");
            return;
        }

        let size = metadata.len();
        if let Some(limit) = self.config.max_file_size {
            if size > limit {
                self.warnings.push(ScanWarning::too_large(&path, size, limit));
                return;
            }
        }

        if !self.seen.insert(path.clone()) {
            return;
        }

        let id = FileId::new(self.records.len() as u32);
        let kind = self.extensions.detect(&extension);
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        self.total_size += size;
        self.records
            .push(FileRecord::new(id, path, size, modified, kind));
    }
}
