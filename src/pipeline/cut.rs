//! End-to-end cut of an IAEA phase-space file pair.

use crate::error::{PhspError, Result};
use crate::pipeline::config::FilterConfig;
use crate::pipeline::engine::{LogObserver, RunResult};
use crate::stream::{
    expected_record_bound, iaea, IaeaSink, IaeaSource, RecordSink, RecordSource, SizeCheck,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Summary of a completed cut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutSummary {
    /// Read attempts made available to the engine.
    pub expected_records: i64,
    pub result: RunResult,
    /// Size of the output record file, if it could be read.
    pub output_bytes: Option<u64>,
    /// Why the output header could not be updated, if it failed.
    /// The records already written are left in place.
    pub header_error: Option<String>,
}

/// Filter `<input_base>.IAEA*` into `<output_base>.IAEA*`.
///
/// Stale output files are removed first. Setup failures (opening the input,
/// an intolerable size check, creating the output, copying the header) are
/// returned before any record is read. A failed header update at the end is
/// logged and reported in [`CutSummary::header_error`].
pub fn cut_phase_space<P, Q>(
    input_base: P,
    output_base: Q,
    config: &FilterConfig,
) -> Result<CutSummary>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let input_base = input_base.as_ref();
    let output_base = output_base.as_ref();
    config.validate()?;

    iaea::remove_files(output_base);

    let mut source = IaeaSource::open(input_base).map_err(|e| PhspError::OpenSource {
        path: input_base.to_path_buf(),
        source: Box::new(e),
    })?;

    match source.check_size_and_byte_order()? {
        SizeCheck::Ok => {}
        SizeCheck::Mismatch(mismatch) if config.size_check.tolerates(&mismatch) => {
            log::warn!(
                "Input file size mismatch (code {}): {}. Continuing.",
                mismatch.code(),
                mismatch
            );
        }
        SizeCheck::Mismatch(mismatch) => return Err(PhspError::SizeCheck(mismatch)),
    }

    let mut sink = IaeaSink::create(output_base).map_err(|e| PhspError::CreateSink {
        path: output_base.to_path_buf(),
        source: Box::new(e),
    })?;

    sink.copy_header(source.header()).map_err(|e| match e {
        PhspError::CopyHeader(_) => e,
        other => PhspError::CopyHeader(other.to_string()),
    })?;
    sink.set_extra_field_counts(0, 0);

    let expected_records = expected_record_bound(source.expected_record_count());
    log::info!("Processing input file ({})...", input_base.display());
    log::info!("Expected records (from header): {}", expected_records);
    log::info!("Window: {}", config.window);

    let (result, header_error) = match config.engine().run(
        &mut source,
        &mut sink,
        expected_records,
        &mut LogObserver,
    ) {
        Ok(result) => (result, None),
        Err(PhspError::Finalize { result, source }) => {
            log::error!("Error updating output header: {}", source);
            (result, Some(source.to_string()))
        }
        Err(e) => return Err(e),
    };

    log::info!("Total records processed: {}", result.processed);
    log::info!("Accepted records (filtered): {}", result.accepted);

    let output_bytes = match fs::metadata(sink.data_path()) {
        Ok(meta) => {
            log::info!("Output PHSP file size: {} bytes.", meta.len());
            Some(meta.len())
        }
        Err(e) => {
            log::warn!("Cannot stat output PHSP file {:?}: {}", sink.data_path(), e);
            None
        }
    };

    source.close();
    sink.close()?;

    Ok(CutSummary {
        expected_records,
        result,
        output_bytes,
        header_error,
    })
}
