//! Emission of the spike detection results
//!
//! Results are written in the layout of Hadoop text outputs: one line per page
//! with the entity key, a tab, then space-separated day before the spike, day
//! after the spike and spike magnitude. For example:
//!
//! ```text
//! enMain_Page	20140601 20140604 51234
//! ```

use crate::{spike::SpikeResult, Result};
use anyhow::Context;
use csv_async::{AsyncWriterBuilder, QuoteStyle};
use serde::Serialize;
use std::path::Path;
use tokio::{
    fs::File,
    io::{AsyncWrite, BufWriter},
};

/// Output record, as serialized in the output file
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
struct OutputRecord<'spike> {
    /// Language code + page title
    entity: &'spike str,

    /// `<day1> <day2> <magnitude>`
    spike: String,
}
//
impl<'spike> From<&SpikeResult<'spike>> for OutputRecord<'spike> {
    fn from(result: &SpikeResult<'spike>) -> Self {
        Self {
            entity: result.entity,
            spike: format!("{} {} {}", result.day1, result.day2, result.magnitude),
        }
    }
}

/// Write the results to a file, or to stdout if no path is specified
pub async fn write_spikes(path: Option<&Path>, spikes: &[SpikeResult<'_>]) -> Result<()> {
    if let Some(path) = path {
        let file = File::create(path)
            .await
            .with_context(|| format!("creating output file {}", path.display()))?;
        write_records(BufWriter::new(file), spikes)
            .await
            .with_context(|| format!("writing results to {}", path.display()))
    } else {
        write_records(BufWriter::new(tokio::io::stdout()), spikes)
            .await
            .context("writing results to stdout")
    }
}

/// Serialize output records into some byte sink
async fn write_records(
    sink: impl AsyncWrite + Unpin + Send,
    spikes: &[SpikeResult<'_>],
) -> Result<()> {
    let mut writer = AsyncWriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .quote_style(QuoteStyle::Never)
        .create_serializer(sink);
    for spike in spikes {
        writer.serialize(OutputRecord::from(spike)).await?;
    }
    writer.flush().await?;
    Ok(())
}
