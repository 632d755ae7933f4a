//! Extraction of hourly page view counts from raw dump lines
//!
//! Lines of the hourly dumps look like `en Main_Page 42 50043`, i.e. project
//! code, page title, number of views and number of bytes served. The date and
//! hour that these counts refer to are not part of the line, they must be
//! deduced from the name of the file, e.g. `pagecounts-20140601-000000.gz`.

use crate::{Day, EntityKey, Hour, HourlyCount, ViewCount};
use std::fmt;
use thiserror::Error;

/// First dash-separated token of every dump file name
pub const SOURCE_PREFIX: &str = "pagecounts";

/// Length of the language codes that we are interested in
///
/// Longer project codes like `de.d` designate sister projects (here the German
/// Wiktionary), which we do not track.
pub const LANGUAGE_CODE_LEN: usize = 2;

/// Raw input record: one line of a dump file, and the name of that file
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RawRecord<'input> {
    /// Text of the line
    pub line: &'input str,

    /// Name of the file that the line comes from
    pub source_name: &'input str,
}

/// Hourly view count of a page, as extracted from a [`RawRecord`]
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct NormalizedTuple {
    /// Language code + page title
    pub entity: EntityKey,

    /// Day on which the views were recorded
    pub day: Day,

    /// Hour of that day on which the views were recorded
    pub hour: Hour,

    /// Number of recorded views
    pub view_count: ViewCount,
}
//
impl NormalizedTuple {
    /// Timestamped data subset of this tuple
    pub fn data(&self) -> HourlyCount {
        HourlyCount {
            day: self.day,
            hour: self.hour,
            view_count: self.view_count,
        }
    }
}

/// Reasons why a record cannot be extracted
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ExtractError {
    /// Line does not have the expected structure
    #[error("expected 4 whitespace-separated fields, found {0}")]
    FieldCount(usize),

    /// Line has a view count which is not a number
    #[error("view count {0:?} is not a non-negative integer")]
    ViewCount(Box<str>),

    /// Name of the source file does not have the expected structure
    #[error("source name {name:?} is malformed: {defect}")]
    SourceName {
        name: Box<str>,
        defect: SourceNameDefect,
    },
}

/// What can be wrong with a source file name
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum SourceNameDefect {
    #[error("expected 3 dash-separated tokens, found {0}")]
    TokenCount(usize),

    #[error("it does not start with \"pagecounts\"")]
    Prefix,

    #[error("date is not in YYYYMMDD format")]
    Date,

    #[error("hour is not a number between 00 and 23")]
    Hour,
}

/// Hour of data collection, as encoded in a dump file name
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SourceHour {
    pub day: Day,
    pub hour: Hour,
}
//
impl SourceHour {
    /// Decode a dump file name of the form `pagecounts-YYYYMMDD-HHmmss<suffix>`
    ///
    /// Any directory prefix is ignored. Runs of consecutive dashes count as a
    /// single separator.
    pub fn parse(source_name: &str) -> Result<Self, ExtractError> {
        let file_name = source_name.rsplit('/').next().unwrap_or(source_name);
        let defect = |defect| ExtractError::SourceName {
            name: file_name.into(),
            defect,
        };
        let mut tokens = file_name.split('-').filter(|token| !token.is_empty());
        let (Some(prefix), Some(date), Some(time), None) =
            (tokens.next(), tokens.next(), tokens.next(), tokens.next())
        else {
            let num_tokens = file_name.split('-').filter(|t| !t.is_empty()).count();
            return Err(defect(SourceNameDefect::TokenCount(num_tokens)));
        };
        if prefix != SOURCE_PREFIX {
            return Err(defect(SourceNameDefect::Prefix));
        }
        let day = Day::parse(date).ok_or_else(|| defect(SourceNameDefect::Date))?;
        let hour = time
            .get(..2)
            .filter(|hh| hh.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|hh| hh.parse::<Hour>().ok())
            .filter(|&hour| hour < 24)
            .ok_or_else(|| defect(SourceNameDefect::Hour))?;
        Ok(Self { day, hour })
    }
}
//
impl fmt::Display for SourceHour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:02}", self.day, self.hour)
    }
}

/// Extract a normalized tuple from a raw record
///
/// Returns `Ok(None)` if the record is well-formed but concerns a project that
/// we are not interested in.
pub fn extract(record: RawRecord<'_>) -> Result<Option<NormalizedTuple>, ExtractError> {
    let (language, title, views) = split_line(record.line)?;
    let source = SourceHour::parse(record.source_name)?;
    normalize(source, language, title, views)
}

/// Split a line into language code, page title and view count fields
fn split_line(line: &str) -> Result<(&str, &str, &str), ExtractError> {
    let mut fields = line.split_whitespace();
    let (Some(language), Some(title), Some(views), Some(_bytes), None) = (
        fields.next(),
        fields.next(),
        fields.next(),
        fields.next(),
        fields.next(),
    ) else {
        return Err(ExtractError::FieldCount(line.split_whitespace().count()));
    };
    Ok((language, title, views))
}

/// Turn the fields of a well-formed line into a tuple, or discard them
fn normalize(
    source: SourceHour,
    language: &str,
    title: &str,
    views: &str,
) -> Result<Option<NormalizedTuple>, ExtractError> {
    if language.chars().count() != LANGUAGE_CODE_LEN {
        return Ok(None);
    }
    let view_count = views
        .parse::<ViewCount>()
        .map_err(|_| ExtractError::ViewCount(views.into()))?;
    let mut entity = String::with_capacity(language.len() + title.len());
    entity.push_str(language);
    entity.push_str(title);
    Ok(Some(NormalizedTuple {
        entity: entity.into(),
        day: source.day,
        hour: source.hour,
        view_count,
    }))
}

/// Emit the diagnostic associated with a malformed record
pub fn report_malformed(line: &str, error: &ExtractError) {
    log::warn!("Dropped malformed record {line:?}: {error}");
}

/// Line extractor for one dump file, which keeps count of what it did
#[derive(Clone, Debug)]
pub struct LineExtractor {
    /// Name of the file
    source_name: Box<str>,

    /// What happened to the lines seen so far
    stats: ExtractStats,
}
//
impl LineExtractor {
    /// Prepare to extract lines from a file
    pub fn new(source_name: impl Into<Box<str>>) -> Self {
        Self {
            source_name: source_name.into(),
            stats: ExtractStats::default(),
        }
    }

    /// Extract a tuple from one line of the file, if possible
    pub fn process(&mut self, line: &str) -> Option<NormalizedTuple> {
        let record = RawRecord {
            line,
            source_name: &self.source_name,
        };
        match extract(record) {
            Ok(Some(tuple)) => {
                self.stats.accepted += 1;
                Some(tuple)
            }
            Ok(None) => {
                log::trace!("Ignored record {line:?} from a project without a language code");
                self.stats.irrelevant += 1;
                None
            }
            Err(e) => {
                report_malformed(line, &e);
                self.stats.malformed += 1;
                None
            }
        }
    }

    /// What happened to the lines seen so far
    pub fn stats(&self) -> ExtractStats {
        self.stats
    }
}

/// Number of records that were accepted or dropped during extraction
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct ExtractStats {
    /// Records that produced a tuple
    pub accepted: u64,

    /// Records from projects without a language code
    pub irrelevant: u64,

    /// Malformed records
    pub malformed: u64,
}
//
impl ExtractStats {
    /// Merge statistics from another file
    pub fn merge(&mut self, other: Self) {
        self.accepted += other.accepted;
        self.irrelevant += other.irrelevant;
        self.malformed += other.malformed;
    }
}
//
impl fmt::Display for ExtractStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records accepted, {} from other projects, {} malformed",
            self.accepted, self.irrelevant, self.malformed
        )
    }
}
