//! Access sessions: ordered, filtered, optionally region-restricted record
//! streams over one open container.
//!
//! An [`AlignmentSession`] owns the backend for the open container and
//! enforces the protocol around it:
//!
//! - open for read *or* write, never both;
//! - exactly one header per open, before any record;
//! - every record read passes region containment, the flag filter, the
//!   statistics hook and sort validation, in that order;
//! - every record written is sort-validated before it reaches the backend.
//!
//! Each operation leaves a [`Status`] on the session. Fallible operations
//! also return it as their error, except [`AlignmentSession::read_record`],
//! which reports misuse as a [`ContractViolation`] and ordinary outcomes
//! through its `bool` plus [`AlignmentSession::status`].
//!
//! # Example
//!
//! ```no_run
//! use alignio::io::bam::{Header, Record};
//! use alignio::session::{AlignmentSession, StatusKind};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = AlignmentSession::new();
//! let mut header = Header::default();
//! session.open_for_read("sorted.bam", Some(&mut header))?;
//! session.read_index(None)?;
//! session.set_read_section("chr1", Some(10_000), Some(20_000))?;
//!
//! let mut record = Record::new();
//! while session.read_record(&header, &mut record)? {
//!     println!("{} {}", record.name, record.alignment_start());
//! }
//! assert_eq!(session.status().kind(), StatusKind::NoMoreRecords);
//! # Ok(())
//! # }
//! ```

pub mod admission;
pub mod region;
pub mod sort;
pub mod statistics;
mod status;

pub use admission::FlagFilter;
pub use region::{OverlapMode, ReferenceSelector, RegionQuery, SectionMatch};
pub use sort::{natural_cmp, SortPolicy, SortValidator, SortViolation};
pub use statistics::AlignmentStatistics;
pub use status::{ContractViolation, Status, StatusKind};

use crate::backend::{open_reader, open_writer, ContainerFormat, FormatBackend, OpenMode};
use crate::error::{AlignError, Result};
use crate::io::bam::{BaiIndex, Chunk, Header, Record, RegionIndex};
use crate::io::bgzf::VirtualOffset;
use flate2::Compression;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Settings applied to every container a session opens.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Sort policy restored on every close. `Unsorted` unless asked for;
    /// `FromHeader` trusts the `@HD SO:` line.
    pub sort_policy: SortPolicy,
    /// Initial flag filter
    pub flags: FlagFilter,
    /// Collect [`AlignmentStatistics`] over accepted records
    pub generate_statistics: bool,
    /// Compression level for `.bam` output
    pub compression: Compression,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sort_policy: SortPolicy::Unsorted,
            flags: FlagFilter::default(),
            generate_statistics: false,
            compression: Compression::default(),
        }
    }
}

/// Stateful access to one SAM/BAM container at a time.
pub struct AlignmentSession {
    config: SessionConfig,
    backend: Option<Box<dyn FormatBackend>>,
    mode: Option<OpenMode>,
    path: Option<PathBuf>,
    has_header: bool,
    record_count: u64,
    flags: FlagFilter,
    sort: SortValidator,
    status: Status,
    index: Option<Box<dyn RegionIndex>>,
    region: RegionQuery,
    region_pending: bool,
    /// Reads are walking `chunks` rather than scanning sequentially
    indexed: bool,
    chunks: VecDeque<Chunk>,
    chunk_end: Option<VirtualOffset>,
    statistics: Option<AlignmentStatistics>,
}

impl AlignmentSession {
    /// Closed session with the default configuration.
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    /// Closed session with `config`.
    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            config,
            backend: None,
            mode: None,
            path: None,
            has_header: false,
            record_count: 0,
            flags: config.flags,
            sort: SortValidator::new(config.sort_policy),
            status: Status::success(),
            index: None,
            region: RegionQuery::all(),
            region_pending: false,
            indexed: false,
            chunks: VecDeque::new(),
            chunk_end: None,
            statistics: config.generate_statistics.then(AlignmentStatistics::new),
        }
    }

    /// Configuration in effect.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn fail(&mut self, kind: StatusKind, message: impl Into<String>) -> Status {
        self.status = Status::new(kind, message);
        self.status.clone()
    }

    fn fail_with(&mut self, err: AlignError) -> Status {
        self.status = err.into();
        self.status.clone()
    }

    fn succeed(&mut self) {
        self.status = Status::success();
    }

    // ----- open / close -----

    /// Open a container for reading, choosing the backend from its content.
    ///
    /// Any open container is closed first; if that fails (a writer that
    /// cannot be flushed) its `FailIo` is returned and nothing new is
    /// opened. When `header` is given the header is read immediately and its
    /// outcome returned.
    pub fn open_for_read<P: AsRef<Path>>(
        &mut self,
        path: P,
        header: Option<&mut Header>,
    ) -> std::result::Result<(), Status> {
        self.close()?;
        let path = path.as_ref();
        let backend = open_reader(path).map_err(|e| {
            self.fail(
                StatusKind::FailIo,
                format!("Failed to open {} for reading: {}", path.display(), e),
            )
        })?;
        self.bind(backend, OpenMode::Read, Some(path.to_path_buf()))?;
        match header {
            Some(header) => self.read_header(header),
            None => Ok(()),
        }
    }

    /// Create a container for writing, choosing the backend from the file
    /// extension.
    ///
    /// Any open container is closed first, with the same close-failure rule
    /// as [`open_for_read`](Self::open_for_read). When `header` is given it
    /// is written immediately and its outcome returned.
    pub fn open_for_write<P: AsRef<Path>>(
        &mut self,
        path: P,
        header: Option<&Header>,
    ) -> std::result::Result<(), Status> {
        self.close()?;
        let path = path.as_ref();
        let backend = open_writer(path, self.config.compression).map_err(|e| {
            self.fail(
                StatusKind::FailIo,
                format!("Failed to open {} for writing: {}", path.display(), e),
            )
        })?;
        self.bind(backend, OpenMode::Write, Some(path.to_path_buf()))?;
        match header {
            Some(header) => self.write_header(header),
            None => Ok(()),
        }
    }

    /// Bind a caller-supplied backend in `mode`.
    ///
    /// The session has no path, so [`read_index`](Self::read_index) needs an
    /// explicit one.
    pub fn open_with_backend(
        &mut self,
        backend: Box<dyn FormatBackend>,
        mode: OpenMode,
    ) -> std::result::Result<(), Status> {
        self.close()?;
        self.bind(backend, mode, None)
    }

    fn bind(
        &mut self,
        mut backend: Box<dyn FormatBackend>,
        mode: OpenMode,
        path: Option<PathBuf>,
    ) -> std::result::Result<(), Status> {
        let label = path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<backend>".to_string());

        match backend.is_eof() {
            Ok(false) => {}
            Ok(true) => {
                return Err(self.fail(
                    StatusKind::FailIo,
                    format!("Failed to open {}: no data", label),
                ))
            }
            Err(e) => {
                return Err(self.fail(
                    StatusKind::FailIo,
                    format!("Failed to open {}: {}", label, e),
                ))
            }
        }

        log::debug!("Opened {} ({}) for {:?}", label, backend.format(), mode);
        self.backend = Some(backend);
        self.mode = Some(mode);
        self.path = path;
        self.succeed();
        Ok(())
    }

    /// Finish and release the container and reset every per-open setting.
    ///
    /// Safe in any state; closing a closed session does nothing. Returns an
    /// error only when flushing a writer fails, after the session has been
    /// reset regardless.
    pub fn close(&mut self) -> std::result::Result<(), Status> {
        let finished = match self.backend.take() {
            Some(mut backend) => {
                let result = backend.finish();
                if let Err(e) = &result {
                    log::warn!("Failed to finish {}: {}", backend.format(), e);
                }
                log::debug!(
                    "Closed {} after {} records",
                    self.path
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| backend.format().to_string()),
                    self.record_count
                );
                result
            }
            None => Ok(()),
        };

        self.mode = None;
        self.path = None;
        self.has_header = false;
        self.record_count = 0;
        self.sort = SortValidator::new(self.config.sort_policy);
        self.index = None;
        self.region = RegionQuery::all();
        self.region_pending = false;
        self.clear_chunks();
        if let Some(stats) = &mut self.statistics {
            stats.reset();
        }

        match finished {
            Ok(()) => {
                self.succeed();
                Ok(())
            }
            Err(e) => Err(self.fail(StatusKind::FailIo, format!("Failed to close: {}", e))),
        }
    }

    // ----- header -----

    /// Read the header. Valid once per open, before any record.
    pub fn read_header(&mut self, header: &mut Header) -> std::result::Result<(), Status> {
        if self.mode != Some(OpenMode::Read) {
            return Err(self.fail(
                StatusKind::FailOrder,
                "Cannot read header since the file is not open for reading",
            ));
        }
        if self.has_header {
            return Err(self.fail(
                StatusKind::FailOrder,
                "Cannot read header since it has already been read",
            ));
        }
        let Some(backend) = self.backend.as_mut() else {
            return Err(self.fail(StatusKind::FailOrder, "No container is open"));
        };
        if let Err(e) = backend.read_header(header) {
            return Err(self.fail_with(e));
        }
        self.has_header = true;
        self.succeed();
        Ok(())
    }

    /// Validate and write the header. Valid once per open, before any record.
    pub fn write_header(&mut self, header: &Header) -> std::result::Result<(), Status> {
        if self.mode != Some(OpenMode::Write) {
            return Err(self.fail(
                StatusKind::FailOrder,
                "Cannot write header since the file is not open for writing",
            ));
        }
        if self.has_header {
            return Err(self.fail(
                StatusKind::FailOrder,
                "Cannot write header since it has already been written",
            ));
        }
        let Some(backend) = self.backend.as_mut() else {
            return Err(self.fail(StatusKind::FailOrder, "No container is open"));
        };
        if let Err(e) = backend.write_header(header) {
            return Err(self.fail_with(e));
        }
        self.has_header = true;
        self.succeed();
        Ok(())
    }

    // ----- records -----

    /// Read the next record that passes the region, flag filter and sort
    /// checks.
    ///
    /// Returns `Ok(true)` with `record` filled in, or `Ok(false)` with the
    /// reason in [`status`](Self::status): `NoMoreRecords` at the end of the
    /// container or region, `InvalidSort`, `FailIo`, `FailParse`, or
    /// `FailOrder` when a region was requested without an index.
    ///
    /// Calling this before opening for read or before reading the header is
    /// a [`ContractViolation`].
    pub fn read_record(
        &mut self,
        header: &Header,
        record: &mut Record,
    ) -> std::result::Result<bool, ContractViolation> {
        if self.mode != Some(OpenMode::Read) || self.backend.is_none() {
            self.fail(
                StatusKind::FailOrder,
                "Cannot read record since the file is not open for reading",
            );
            return Err(ContractViolation::NotOpenForRead);
        }
        if !self.has_header {
            self.fail(
                StatusKind::FailOrder,
                "Cannot read record since the header has not been read",
            );
            return Err(ContractViolation::HeaderNotRead);
        }
        self.succeed();

        if self.region_pending && !self.start_region(header) {
            return Ok(false);
        }

        loop {
            match self.next_candidate(header, record) {
                Ok(true) => {}
                Ok(false) => {
                    self.fail(StatusKind::NoMoreRecords, "No more records");
                    return Ok(false);
                }
                Err(e) => {
                    self.fail_with(e);
                    return Ok(false);
                }
            }

            match self.region.check(record) {
                SectionMatch::Accept => {}
                SectionMatch::Skip => continue,
                SectionMatch::Exhausted => {
                    self.fail(StatusKind::NoMoreRecords, "No more records in the region");
                    return Ok(false);
                }
            }

            if !self.flags.admits(record) {
                continue;
            }

            self.record_count += 1;
            if let Some(stats) = &mut self.statistics {
                stats.update(record);
            }

            if let Err(violation) = self.sort.check(header, record, self.record_count) {
                self.fail(StatusKind::InvalidSort, violation.0);
                return Ok(false);
            }
            return Ok(true);
        }
    }

    /// Pull the next raw record from the backend, moving between chunks when
    /// reading by index.
    fn next_candidate(&mut self, header: &Header, record: &mut Record) -> Result<bool> {
        let backend = match self.backend.as_mut() {
            Some(backend) => backend,
            None => return Ok(false),
        };

        if self.indexed {
            loop {
                let position = backend.tell().ok_or_else(|| {
                    AlignError::Unsupported(format!(
                        "{} backend cannot report positions",
                        backend.format()
                    ))
                })?;
                if matches!(self.chunk_end, Some(end) if position < end) {
                    break;
                }
                let Some(chunk) = self.chunks.pop_front() else {
                    return Ok(false);
                };
                let start = match backend.data_start() {
                    Some(first) => chunk.start.max(first),
                    None => chunk.start,
                };
                if start != position {
                    log::trace!("Moving from {} to chunk {}..{}", position, start, chunk.end);
                    backend.seek(start)?;
                }
                self.chunk_end = Some(chunk.end);
            }
        }

        backend.read_record(header, record)
    }

    /// Resolve the pending region and prepare chunk iteration. On failure the
    /// status is set and `false` returned.
    fn start_region(&mut self, header: &Header) -> bool {
        self.region_pending = false;
        self.clear_chunks();

        let Some(resolved) = self.region.selector.resolve(header) else {
            self.fail(
                StatusKind::NoMoreRecords,
                format!("Reference '{}' is not in the header", self.region.selector),
            );
            return false;
        };
        self.region.selector = resolved;

        let Some(reference) = self.region.selector.target() else {
            // All: sequential scan from wherever the stream is
            return true;
        };
        let (start, end) = (self.region.start, self.region.end);
        let Some(backend) = self.backend.as_mut() else {
            return false;
        };

        if backend.resolves_regions() {
            return match backend.restrict_to_region(reference, start, end) {
                Ok(true) => true,
                Ok(false) => {
                    let described = self.region.describe(header);
                    self.fail(
                        StatusKind::FailParse,
                        format!("Failed to restrict reads to {}", described),
                    );
                    false
                }
                Err(e) => {
                    self.fail_with(e);
                    false
                }
            };
        }

        if backend.tell().is_none() {
            let format = backend.format();
            self.fail(
                StatusKind::FailOrder,
                format!("Cannot read a section of a {} container", format),
            );
            return false;
        }
        let Some(index) = self.index.as_ref() else {
            self.fail(
                StatusKind::FailOrder,
                "Cannot read section since there is no index file open",
            );
            return false;
        };

        match index.chunks_for_region(reference, start, end) {
            Some(chunks) => {
                log::debug!(
                    "Region {} resolved to {} chunks",
                    self.region.describe(header),
                    chunks.len()
                );
                self.chunks = chunks.into();
                self.indexed = true;
                true
            }
            None => {
                let described = self.region.describe(header);
                self.fail(
                    StatusKind::FailParse,
                    format!(
                        "Failed to get the specified region, reference = {}; start = {:?}; end = {:?} ({})",
                        self.region.selector, start, end, described
                    ),
                );
                false
            }
        }
    }

    fn clear_chunks(&mut self) {
        self.chunks.clear();
        self.chunk_end = None;
        self.indexed = false;
    }

    /// Sort-validate and write one record. Nothing is written on a sort
    /// violation.
    pub fn write_record(&mut self, header: &Header, record: &Record) -> std::result::Result<(), Status> {
        if self.mode != Some(OpenMode::Write) {
            return Err(self.fail(
                StatusKind::FailOrder,
                "Cannot write record since the file is not open for writing",
            ));
        }
        if !self.has_header {
            return Err(self.fail(
                StatusKind::FailOrder,
                "Cannot write record since the header has not been written",
            ));
        }

        if let Err(violation) = self.sort.check(header, record, self.record_count + 1) {
            return Err(self.fail(
                StatusKind::InvalidSort,
                format!(
                    "Cannot write the record since the file is not properly sorted: {}",
                    violation
                ),
            ));
        }

        let Some(backend) = self.backend.as_mut() else {
            return Err(self.fail(StatusKind::FailOrder, "No container is open"));
        };
        if let Err(e) = backend.write_record(header, record) {
            return Err(self.fail_with(e));
        }
        self.record_count += 1;
        self.succeed();
        Ok(())
    }

    /// Iterate over the remaining admitted records.
    ///
    /// The iterator ends at `NoMoreRecords`; any other failure is yielded
    /// once as an error.
    pub fn records<'a>(&'a mut self, header: &'a Header) -> SessionRecords<'a> {
        SessionRecords {
            session: self,
            header,
            done: false,
        }
    }

    // ----- regions and filters -----

    /// Restrict reads to overlaps with `[start, end)` on `selector`.
    ///
    /// Nothing is looked up until the next read. `None` bounds are open;
    /// `"*"`/`""` select the unmapped reads at the end of the container.
    pub fn set_read_section(
        &mut self,
        selector: impl Into<ReferenceSelector>,
        start: Option<i64>,
        end: Option<i64>,
    ) -> std::result::Result<(), Status> {
        self.set_read_section_with_mode(selector, start, end, OverlapMode::Overlap)
    }

    /// [`set_read_section`](Self::set_read_section) with an explicit
    /// containment rule.
    pub fn set_read_section_with_mode(
        &mut self,
        selector: impl Into<ReferenceSelector>,
        start: Option<i64>,
        end: Option<i64>,
        mode: OverlapMode,
    ) -> std::result::Result<(), Status> {
        if self.mode != Some(OpenMode::Read) {
            return Err(self.fail(
                StatusKind::FailOrder,
                "Cannot set section since there is no file open for reading",
            ));
        }
        self.region = RegionQuery::new(selector, start, end, mode);
        self.region_pending = true;
        self.clear_chunks();
        self.sort.reset();
        self.succeed();
        Ok(())
    }

    /// Current region query.
    pub fn read_section(&self) -> &RegionQuery {
        &self.region
    }

    /// Change the sort policy; takes effect at the next record.
    pub fn set_sort_validation(&mut self, policy: SortPolicy) {
        self.sort.set_policy(policy);
    }

    /// Only return records with every `required` bit and no `excluded` bit.
    /// Kept across close and reopen.
    pub fn set_read_flags(&mut self, required: u16, excluded: u16) {
        self.flags = FlagFilter::new(required, excluded);
    }

    /// Flag filter in effect.
    pub fn read_flags(&self) -> FlagFilter {
        self.flags
    }

    /// Aligned bases of `record` inside the current region.
    pub fn overlapping_bases(&self, record: &Record) -> u64 {
        record.overlapping_bases(self.region.start, self.region.end)
    }

    // ----- index -----

    /// Load the region index.
    ///
    /// With no `path`, tries `<container>.bai`, then the container name with
    /// `.bam` replaced by `.bai`.
    pub fn read_index(&mut self, path: Option<&Path>) -> std::result::Result<(), Status> {
        if !self.is_open() {
            return Err(self.fail(
                StatusKind::FailOrder,
                "File must be open before reading its index",
            ));
        }

        if let Some(path) = path {
            return self.load_index(path);
        }

        let Some(container) = self.path.clone() else {
            return Err(self.fail(
                StatusKind::FailOrder,
                "Cannot locate the index: the container was opened without a path",
            ));
        };
        for candidate in index_candidates(&container) {
            if self.load_index(&candidate).is_ok() {
                return Ok(());
            }
        }
        Err(self.fail(
            StatusKind::FailIo,
            format!("Failed to read the index for {}", container.display()),
        ))
    }

    fn load_index(&mut self, path: &Path) -> std::result::Result<(), Status> {
        let is_bai = path.extension().and_then(|e| e.to_str()) == Some("bai");
        let bai = if is_bai {
            match BaiIndex::from_path(path) {
                Ok(index) => Some(index),
                Err(e) => {
                    return Err(self.fail(
                        StatusKind::FailIo,
                        format!("Failed to read the index file {}: {}", path.display(), e),
                    ))
                }
            }
        } else {
            None
        };

        let loaded_by_backend = match self.backend.as_mut().map(|b| b.load_index(path)) {
            Some(Ok(loaded)) => loaded,
            Some(Err(e)) => {
                return Err(self.fail(
                    StatusKind::FailIo,
                    format!("Failed to load the index {}: {}", path.display(), e),
                ))
            }
            None => false,
        };

        match bai {
            Some(index) => {
                log::debug!(
                    "Loaded index {} ({} references)",
                    path.display(),
                    index.reference_count()
                );
                self.index = Some(Box::new(index));
            }
            None if loaded_by_backend => {
                log::debug!("Backend loaded index {}", path.display());
            }
            None => {
                return Err(self.fail(
                    StatusKind::FailIo,
                    format!("{} is not a usable index", path.display()),
                ))
            }
        }
        self.succeed();
        Ok(())
    }

    /// Use `index` for region queries on the open container.
    pub fn set_index(&mut self, index: Box<dyn RegionIndex>) -> std::result::Result<(), Status> {
        if !self.is_open() {
            return Err(self.fail(
                StatusKind::FailOrder,
                "File must be open before setting its index",
            ));
        }
        self.index = Some(index);
        self.succeed();
        Ok(())
    }

    /// Whether an index is loaded.
    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    fn with_index<T>(
        &mut self,
        what: &str,
        f: impl FnOnce(&dyn RegionIndex) -> T,
    ) -> std::result::Result<T, Status> {
        match self.index.as_deref() {
            Some(index) => {
                let value = f(index);
                self.succeed();
                Ok(value)
            }
            None => Err(self.fail(
                StatusKind::FailOrder,
                format!("Cannot get {} from the index until it has been read", what),
            )),
        }
    }

    /// Mapped reads on `reference` (`None` = unmapped pseudo-reference)
    /// according to the index. `Ok(None)` for references outside the index.
    pub fn mapped_reads_from_index(
        &mut self,
        reference: Option<usize>,
    ) -> std::result::Result<Option<u64>, Status> {
        self.with_index("mapped reads", |index| index.mapped_read_count(reference))
    }

    /// Unmapped reads on `reference` according to the index.
    pub fn unmapped_reads_from_index(
        &mut self,
        reference: Option<usize>,
    ) -> std::result::Result<Option<u64>, Status> {
        self.with_index("unmapped reads", |index| index.unmapped_read_count(reference))
    }

    /// [`mapped_reads_from_index`](Self::mapped_reads_from_index) by reference
    /// name; `""` and `"*"` mean unmapped.
    pub fn mapped_reads_from_index_by_name(
        &mut self,
        name: &str,
        header: &Header,
    ) -> std::result::Result<Option<u64>, Status> {
        match reference_by_name(name, header) {
            Some(reference) => self.mapped_reads_from_index(reference),
            None => self.with_index("mapped reads", |_| None),
        }
    }

    /// [`unmapped_reads_from_index`](Self::unmapped_reads_from_index) by
    /// reference name; `""` and `"*"` mean unmapped.
    pub fn unmapped_reads_from_index_by_name(
        &mut self,
        name: &str,
        header: &Header,
    ) -> std::result::Result<Option<u64>, Status> {
        match reference_by_name(name, header) {
            Some(reference) => self.unmapped_reads_from_index(reference),
            None => self.with_index("unmapped reads", |_| None),
        }
    }

    // ----- statistics and state -----

    /// Turn statistics collection on or off. Turning it off discards the
    /// counters.
    pub fn generate_statistics(&mut self, enabled: bool) {
        match (enabled, self.statistics.is_some()) {
            (true, false) => self.statistics = Some(AlignmentStatistics::new()),
            (false, true) => self.statistics = None,
            _ => {}
        }
    }

    /// Counters over accepted records, when enabled.
    pub fn statistics(&self) -> Option<&AlignmentStatistics> {
        self.statistics.as_ref()
    }

    /// Whether a container is open in either direction.
    pub fn is_open(&self) -> bool {
        self.mode.is_some()
    }

    /// Direction of the open container.
    pub fn mode(&self) -> Option<OpenMode> {
        self.mode
    }

    /// True unless open for reading with data left in the stream.
    pub fn is_eof(&mut self) -> bool {
        if self.mode != Some(OpenMode::Read) {
            return true;
        }
        match self.backend.as_mut() {
            Some(backend) => backend.is_eof().unwrap_or(true),
            None => true,
        }
    }

    /// Records accepted (read) or written since opening.
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Outcome of the last operation.
    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Format of the open container.
    pub fn format(&self) -> Option<ContainerFormat> {
        self.backend.as_ref().map(|b| b.format())
    }

    /// Path of the open container, when opened by path.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Default for AlignmentSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AlignmentSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// `Some(None)` for the unmapped pseudo-reference, `Some(Some(id))` for a
/// known name, `None` for an unknown one.
fn reference_by_name(name: &str, header: &Header) -> Option<Option<usize>> {
    match ReferenceSelector::name(name).resolve(header)? {
        ReferenceSelector::Index(id) => Some(Some(id)),
        _ => Some(None),
    }
}

/// Index files to try for `container`, in order.
fn index_candidates(container: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from(format!("{}.bai", container.display()))];
    if container.extension().and_then(|e| e.to_str()) == Some("bam") {
        candidates.push(container.with_extension("bai"));
    }
    candidates
}

/// Iterator returned by [`AlignmentSession::records`].
pub struct SessionRecords<'a> {
    session: &'a mut AlignmentSession,
    header: &'a Header,
    done: bool,
}

impl Iterator for SessionRecords<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut record = Record::new();
        match self.session.read_record(self.header, &mut record) {
            Ok(true) => Some(Ok(record)),
            Ok(false) => {
                self.done = true;
                let status = self.session.status();
                if status.kind() == StatusKind::NoMoreRecords {
                    None
                } else {
                    Some(Err(AlignError::Session(status.clone())))
                }
            }
            Err(violation) => {
                self.done = true;
                Some(Err(violation.into()))
            }
        }
    }
}
