//! Reading of hourly dump files, from local storage or from the network

use crate::{
    config::Config,
    dataset::{
        builder::{DatasetBuilder, DatasetFiles},
        Dataset,
    },
    extract::LineExtractor,
    progress::{ProgressReport, ProgressTracker, Work},
    Result,
};
use anyhow::Context;
use async_compression::tokio::bufread::GzipDecoder;
use futures::{StreamExt, TryStreamExt};
use reqwest::Response;
use std::{
    fmt,
    io::{self, ErrorKind},
    path::PathBuf,
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    task::JoinSet,
};
use tokio_util::io::{ReaderStream, StreamReader};

/// Location of an hourly dump file
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Source {
    /// File from local storage
    File(PathBuf),

    /// File to be downloaded over HTTP(S)
    Url(Box<str>),
}
//
impl Source {
    /// Name of the file, which tells when its data was collected
    pub fn file_name(&self) -> &str {
        match self {
            Source::File(path) => path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default(),
            Source::Url(url) => {
                let path = url.split(['?', '#']).next().unwrap_or_default();
                path.rsplit('/').next().unwrap_or_default()
            }
        }
    }

    /// Truth that the file is gzip-compressed
    pub fn is_gzipped(&self) -> bool {
        self.file_name().ends_with(".gz")
    }
}
//
impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::File(path) => write!(f, "{}", path.display()),
            Source::Url(url) => write!(f, "{url}"),
        }
    }
}

/// Turn user-specified input locations into a list of dump files
///
/// Directories are replaced by the regular files that they directly contain,
/// in file name order.
pub async fn resolve(inputs: &[Box<str>]) -> Result<Vec<Source>> {
    let mut sources = Vec::new();
    for input in inputs {
        if input.starts_with("http://") || input.starts_with("https://") {
            sources.push(Source::Url(input.clone()));
            continue;
        }
        let path = PathBuf::from(&**input);
        let metadata = fs::metadata(&path)
            .await
            .with_context(|| format!("looking up input {input}"))?;
        if !metadata.is_dir() {
            sources.push(Source::File(path));
            continue;
        }
        let context = || format!("listing input directory {input}");
        let mut entries = fs::read_dir(&path).await.with_context(context)?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.with_context(context)? {
            if entry.file_type().await.with_context(context)?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        log::debug!("Found {} files in input directory {input}", files.len());
        sources.extend(files.into_iter().map(Source::File));
    }
    Ok(sources)
}

/// Read a set of dump files, extract their data and group it by page
pub async fn read_and_collect(
    config: Arc<Config>,
    client: reqwest::Client,
    sources: Vec<Source>,
    report: &ProgressReport,
) -> Result<Arc<Dataset>> {
    // Track file opening and data reading
    let opened = report.add("Opening input files", Work::Steps(sources.len()));
    let bytes = report.add_growing("Reading and extracting data", Work::Bytes(0));
    if sources.is_empty() {
        bytes.done_adding_work();
    }

    // Start reading all files
    let num_sources = sources.len();
    let mut data_files = JoinSet::new();
    for source in sources {
        data_files.spawn(read_and_extract(
            config.clone(),
            client.clone(),
            source,
            opened.clone(),
            bytes.clone(),
        ));
    }

    // Merge data from files as they are done
    let mut dataset = DatasetFiles::new(config);
    while let Some(file_data) = data_files.join_next().await {
        dataset.merge(file_data.context("collecting results from one input file")??)
    }
    log::info!("Extracted {num_sources} input files: {}", dataset.stats());
    let dataset = dataset.finish(report);
    log::info!("Grouped data into {} pages", dataset.num_entities());
    Ok(dataset)
}

/// Read a dump file and extract the data inside
pub async fn read_and_extract(
    config: Arc<Config>,
    client: reqwest::Client,
    source: Source,
    opened: ProgressTracker,
    bytes: ProgressTracker,
) -> Result<DatasetFiles> {
    // The name of the file tells when its data was collected, so every line
    // of a misnamed file will be reported as malformed
    let extractor = LineExtractor::new(source.file_name());
    let dataset = DatasetBuilder::new(config);
    let context = || format!("reading and processing {source}");

    // Open the file and slice it into chunks of bytes, tracking how many bytes
    // have been read so far
    let track = |len: u64| {
        bytes.add_work(len);
        if opened.inc(1) {
            bytes.done_adding_work();
        }
        let bytes = bytes.clone();
        move |chunk_len: usize| {
            bytes.inc(chunk_len as u64);
        }
    };
    let gzipped = source.is_gzipped();
    match &source {
        Source::File(path) => {
            let file = File::open(path)
                .await
                .with_context(|| format!("opening {source}"))?;
            let len = file
                .metadata()
                .await
                .with_context(|| format!("querying the size of {source}"))?
                .len();
            let on_chunk = track(len);
            let chunks = ReaderStream::new(file).inspect_ok(move |chunk| on_chunk(chunk.len()));
            extract_lines(StreamReader::new(chunks), gzipped, extractor, dataset)
                .await
                .with_context(context)
        }
        Source::Url(url) => {
            let response = client
                .get(&**url)
                .send()
                .await
                .and_then(Response::error_for_status)
                .with_context(|| format!("initiating download of {source}"))?;
            let on_chunk = track(response.content_length().unwrap_or(0));
            let chunks = response.bytes_stream().map(move |res| {
                res
                    // Track how many bytes have been downloaded so far
                    .inspect(|chunk| on_chunk(chunk.len()))
                    // Translate reqwest errors into I/O errors
                    .map_err(|e| io::Error::new(ErrorKind::Other, Box::new(e)))
            });
            extract_lines(StreamReader::new(chunks), gzipped, extractor, dataset)
                .await
                .with_context(context)
        }
    }
}

/// Extract tuples from the lines of a possibly compressed dump file
async fn extract_lines(
    reader: impl AsyncBufRead,
    gzipped: bool,
    extractor: LineExtractor,
    dataset: DatasetBuilder,
) -> Result<DatasetFiles> {
    if gzipped {
        let mut decoder = GzipDecoder::new(reader);
        decoder.multiple_members(true);
        extract_text(BufReader::new(decoder), extractor, dataset).await
    } else {
        extract_text(reader, extractor, dataset).await
    }
}

/// Extract tuples from the lines of an uncompressed dump file
///
/// Invalid UTF-8 in page titles is replaced rather than treated as an error, as
/// a couple of bad bytes should not cost us a whole hour of data.
async fn extract_text(
    reader: impl AsyncBufRead,
    mut extractor: LineExtractor,
    mut dataset: DatasetBuilder,
) -> Result<DatasetFiles> {
    let mut reader = std::pin::pin!(reader);
    let mut buf = Vec::new();
    while reader.read_until(b'\n', &mut buf).await? > 0 {
        if let Some(tuple) = extractor.process(&String::from_utf8_lossy(&buf)) {
            dataset.add_tuple(tuple);
        }
        buf.clear();
    }
    Ok(dataset.finish_file(extractor.stats()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{extract::ExtractStats, spike};
    use async_compression::tokio::write::GzipEncoder;
    use std::path::Path;
    use tokio::io::AsyncWriteExt;

    async fn write_plain(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).await.unwrap();
        path
    }

    async fn write_gzipped(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let mut encoder = GzipEncoder::new(Vec::new());
        encoder.write_all(contents.as_bytes()).await.unwrap();
        encoder.shutdown().await.unwrap();
        let path = dir.join(name);
        fs::write(&path, encoder.into_inner()).await.unwrap();
        path
    }

    #[test]
    fn source_names() {
        let file = Source::File("/data/pagecounts-20140601-000000.gz".into());
        assert_eq!(file.file_name(), "pagecounts-20140601-000000.gz");
        assert!(file.is_gzipped());
        let url = Source::Url(
            "https://dumps.wikimedia.org/other/pagecounts-raw/2014/2014-06/pagecounts-20140601-010000.gz?x=1"
                .into(),
        );
        assert_eq!(url.file_name(), "pagecounts-20140601-010000.gz");
        assert!(url.is_gzipped());
        assert!(!Source::File("pagecounts-20140601-020000".into()).is_gzipped());
    }

    #[tokio::test]
    async fn resolves_directories_and_urls() {
        let dir = tempfile::tempdir().unwrap();
        write_plain(dir.path(), "pagecounts-20140602-000000", "").await;
        write_plain(dir.path(), "pagecounts-20140601-000000", "").await;
        fs::create_dir(dir.path().join("nested")).await.unwrap();
        let single = write_plain(dir.path(), "nested/pagecounts-20140603-000000", "").await;

        let inputs: [Box<str>; 3] = [
            dir.path().to_str().unwrap().into(),
            single.to_str().unwrap().into(),
            "http://example.org/pagecounts-20140604-000000.gz".into(),
        ];
        let sources = resolve(&inputs).await.unwrap();
        assert_eq!(
            sources,
            [
                Source::File(dir.path().join("pagecounts-20140601-000000")),
                Source::File(dir.path().join("pagecounts-20140602-000000")),
                Source::File(single),
                Source::Url("http://example.org/pagecounts-20140604-000000.gz".into()),
            ]
        );

        let missing: [Box<str>; 1] = ["/this/does/not/exist".into()];
        assert!(resolve(&missing).await.is_err());
    }

    #[tokio::test]
    async fn reads_plain_and_gzipped_files() {
        let dir = tempfile::tempdir().unwrap();
        let sources = vec![
            write_plain(
                dir.path(),
                "pagecounts-20140601-000000",
                "en Main_Page 10 100\nde.d Freiheit 176 314159\nfr Paris 3 30\n",
            )
            .await,
            write_gzipped(
                dir.path(),
                "pagecounts-20140601-010000.gz",
                "en Main_Page 5 100\nbroken line\nfr Paris 4 30",
            )
            .await,
            write_gzipped(
                dir.path(),
                "pagecounts-20140602-000000.gz",
                "en Main_Page 40 100\nfr Paris 1 30\n",
            )
            .await,
            write_plain(dir.path(), "pagecounts-20140603-120000", "en Main_Page 60 100\n").await,
            // Misnamed file, whose contents must be ignored
            write_plain(dir.path(), "pageviews-20140604-000000", "en Main_Page 999 100\n").await,
        ]
        .into_iter()
        .map(Source::File)
        .collect();

        let config = Config::for_tests(1);
        let dataset = read_and_collect(
            config,
            reqwest::Client::new(),
            sources,
            &ProgressReport::hidden(),
        )
        .await
        .unwrap();

        let spikes = dataset
            .entities()
            .map(|entity| {
                let result = spike::aggregate(entity.key(), entity.hours());
                (
                    result.entity.to_owned(),
                    result.day1.to_string(),
                    result.day2.to_string(),
                    result.magnitude,
                )
            })
            .collect::<Vec<_>>();
        assert_eq!(
            spikes,
            [
                (
                    "enMain_Page".to_owned(),
                    "20140602".to_owned(),
                    "20140603".to_owned(),
                    20,
                ),
                (
                    "frParis".to_owned(),
                    "20140601".to_owned(),
                    "20140601".to_owned(),
                    0,
                ),
            ]
        );
    }

    #[tokio::test]
    async fn misnamed_files_yield_malformed_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_plain(
            dir.path(),
            "pageviews-20140601-000000",
            "en Main_Page 10 100\nde.d Freiheit 176 314159\nfr Paris 3 30\n",
        )
        .await;
        let report = ProgressReport::hidden();
        let files = read_and_extract(
            Config::for_tests(1),
            reqwest::Client::new(),
            Source::File(path),
            report.add("opened", Work::Steps(1)),
            report.add_growing("bytes", Work::Bytes(0)),
        )
        .await
        .unwrap();
        assert_eq!(
            files.stats(),
            ExtractStats {
                accepted: 0,
                irrelevant: 0,
                malformed: 3,
            }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_files_finish_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for hour in 0..16 {
            let name = format!("pagecounts-20140601-{hour:02}0000");
            paths.push(write_plain(dir.path(), &name, "").await);
        }
        for _ in 0..50 {
            let sources = paths.iter().cloned().map(Source::File).collect();
            let dataset = read_and_collect(
                Config::for_tests(1),
                reqwest::Client::new(),
                sources,
                &ProgressReport::hidden(),
            )
            .await
            .unwrap();
            assert_eq!(dataset.num_entities(), 0);
        }
    }

    #[tokio::test]
    async fn missing_files_are_fatal() {
        let result = read_and_collect(
            Config::for_tests(1),
            reqwest::Client::new(),
            vec![Source::File("/nowhere/pagecounts-20140601-000000".into())],
            &ProgressReport::hidden(),
        )
        .await;
        assert!(result.is_err());
    }
}
