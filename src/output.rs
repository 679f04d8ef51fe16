//! This module is in charge of outputting the final selection results to
//! various files

use crate::{
    aggregator::{Diagnostics, FinalResults},
    category::Category,
    features::ParallelPolicy,
    histogram::{Binning, Histogram},
    histset::CutFlow,
    numeric::{reals, Float},
    Result,
};
use eyre::WrapErr;
use serde::Serialize;
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    time::Duration,
};

/// Number of significant digits in text output
const SIG_DIGITS: usize = (reals::DIGITS - 1) as usize;

/// Horizontal rule used to separate summary sections
const RULE: &str = "---------------------------------------------";

/// Write the selection results to `<prefix>.summary`, `<prefix>.times` and
/// `<prefix>.json`
pub fn dump_results(results: &FinalResults, prefix: &str, elapsed_time: Duration) -> Result<()> {
    let create = |extension: &str| -> Result<BufWriter<File>> {
        let path = format!("{prefix}.{extension}");
        let file = File::create(&path).wrap_err_with(|| format!("Failed to create {path}"))?;
        Ok(BufWriter::new(file))
    };

    // Write execution timings to a file
    {
        let mut tim_file = create("times")?;
        write_times(&mut tim_file, results, elapsed_time)?;
        tim_file.flush()?;
    }

    // Write the human-readable summary
    {
        let mut summary_file = create("summary")?;
        write_summary(&mut summary_file, results)?;
        summary_file.flush()?;
    }

    // Write the histograms in machine-readable form
    {
        let mut json_file = create("json")?;
        serde_json::to_writer_pretty(&mut json_file, &ResultsDocument::new(results))
            .wrap_err("Failed to serialize the histograms")?;
        writeln!(json_file)?;
        json_file.flush()?;
    }

    Ok(())
}

/// Write a timestamp and performance figures
fn write_times(
    file: &mut impl Write,
    results: &FinalResults,
    elapsed_time: Duration,
) -> Result<()> {
    // Compute a timestamp of when the run ended
    let format = time::format_description::parse(
        "[day]-[month repr:short]-[year repr:last_two]   [hour]:[minute]:[second]",
    )?;
    let timestamp = time::OffsetDateTime::now_utc().format(&format)?;
    writeln_col(file, &timestamp[..])?;

    // Write program performance stats
    let elapsed_secs = elapsed_time.as_secs_f64() as Float;
    let num_events = results.diagnostics.processed_events + results.diagnostics.malformed_events;
    writeln_col(file, RULE)?;
    writeln_col(file, ("Elapsed time (s)", elapsed_secs))?;
    writeln_col(file, ("Events read", num_events))?;
    if num_events > 0 {
        writeln_col(file, ("Time per event (s)", elapsed_secs / num_events as Float))?;
    }
    Ok(())
}

/// Write the configuration, diagnostic counters and cut-flow table
fn write_summary(file: &mut impl Write, results: &FinalResults) -> Result<()> {
    let cfg = results.cfg;

    // Run configuration
    writeln_col(file, ("Beam center shift x", cfg.center_shift[0]))?;
    writeln_col(file, ("Beam center shift y", cfg.center_shift[1]))?;
    match cfg.on_parallel {
        ParallelPolicy::Skip => writeln_col(file, ("Parallel trajectories", "skipped"))?,
        ParallelPolicy::Sentinel(value) => {
            writeln_col(file, ("Parallel trajectories -> sentinel", value))?
        }
    }
    for site in &cfg.sites {
        let plane = site.plane();
        writeln_col(
            file,
            (
                &format!("Site {}", site.name())[..],
                &format!(
                    "point {:?}, normal {:?}, baseline {}",
                    plane.point().as_slice(),
                    plane.normal().as_slice(),
                    site.baseline()
                )[..],
            ),
        )?;
    }
    for (idx, cut) in cfg.cuts.iter().enumerate() {
        writeln_col(file, (&format!("Cut #{}", idx + 1)[..], cut.name()))?;
    }

    // Diagnostic counters
    let diag = &results.diagnostics;
    writeln_col(file, RULE)?;
    writeln_col(file, ("Processed events", diag.processed_events))?;
    writeln_col(file, ("Malformed events", diag.malformed_events))?;
    writeln_col(file, ("Filled candidates", diag.filled_candidates))?;
    writeln_col(file, ("Skipped: parallel trajectory", diag.parallel_trajectories))?;
    writeln_col(file, ("Skipped: missing feature", diag.missing_features))?;
    writeln_col(file, ("Sentinel substitutions", diag.sentinel_substitutions))?;

    // Cut flow, as the number of candidates surviving each successive cut
    writeln_col(file, RULE)?;
    write_cut_flow(file, results.histograms.cut_flow(), |idx| {
        cfg.cuts.iter().nth(idx).map_or("?", |cut| cut.name())
    })?;

    // Histogram overview
    writeln_col(file, RULE)?;
    for (decl, hist) in results.histograms.iter() {
        writeln_col(
            file,
            (
                &format!("{} ({} events)", decl.name, hist.entries())[..],
                hist.total_weight(),
            ),
        )?;
    }
    Ok(())
}

/// Write the cumulative cut-flow table, one column per category
fn write_cut_flow<'a>(
    file: &mut impl Write,
    cut_flow: &CutFlow,
    cut_name: impl Fn(usize) -> &'a str,
) -> io::Result<()> {
    write!(file, " {:<31}", "Cut")?;
    for category in Category::ALL {
        write!(file, " {:>10}", category.name())?;
    }
    writeln!(file)?;
    for passed in 0..=cut_flow.num_cuts() {
        let label = if passed == 0 {
            "(all candidates)"
        } else {
            cut_name(passed - 1)
        };
        write!(file, " {label:<31}")?;
        for category in Category::ALL {
            write!(file, " {:>10}", cut_flow.cumulative_count(category, passed))?;
        }
        writeln!(file)?;
    }
    Ok(())
}

/// Serialized form of the final results
#[derive(Serialize)]
struct ResultsDocument<'a> {
    diagnostics: &'a Diagnostics,
    cuts: Vec<&'a str>,
    categories: Vec<&'static str>,
    cut_flow: &'a CutFlow,
    histograms: Vec<HistogramDocument<'a>>,
}
//
impl<'a> ResultsDocument<'a> {
    fn new(results: &'a FinalResults) -> Self {
        let cfg = results.cfg;
        Self {
            diagnostics: &results.diagnostics,
            cuts: cfg.cuts.iter().map(|cut| cut.name()).collect(),
            categories: Category::ALL.iter().map(|c| c.name()).collect(),
            cut_flow: results.histograms.cut_flow(),
            histograms: results
                .histograms
                .iter()
                .map(|(decl, histogram)| HistogramDocument {
                    name: &decl.name,
                    category: decl.category.to_string(),
                    gate: decl.state.describe(&cfg.cuts),
                    axes: decl
                        .axes
                        .iter()
                        .map(|axis| AxisDocument {
                            observable: axis.observable.describe(&cfg.sites),
                            binning: axis.binning,
                        })
                        .collect(),
                    histogram,
                })
                .collect(),
        }
    }
}

/// Serialized form of one histogram, along with its declaration
#[derive(Serialize)]
struct HistogramDocument<'a> {
    name: &'a str,
    category: String,
    gate: String,
    axes: Vec<AxisDocument>,
    histogram: &'a Histogram,
}

/// Serialized form of one histogram axis declaration
#[derive(Serialize)]
struct AxisDocument {
    observable: String,
    binning: Binning,
}

/// Text output facility for the summary and timing files
fn writeln_col(file: &mut impl Write, data: impl WriteColumn) -> io::Result<()> {
    write!(file, " ")?;
    data.write(file)?;
    writeln!(file)
}

/// Trait implemented by things which can be printed in the key/value column
/// style of the summary files
trait WriteColumn: Sized {
    /// Write down `self` to the output file
    fn write(self, file: &mut impl Write) -> io::Result<()>;
}

impl WriteColumn for &str {
    fn write(self, file: &mut impl Write) -> io::Result<()> {
        write!(file, "{self}")
    }
}

impl WriteColumn for u64 {
    fn write(self, file: &mut impl Write) -> io::Result<()> {
        write!(file, "{self}")
    }
}

impl WriteColumn for Float {
    // Close approximation of the %g format
    fn write(self, file: &mut impl Write) -> io::Result<()> {
        write_engineering(file, self, SIG_DIGITS)
    }
}

impl<T: WriteColumn> WriteColumn for (&str, T) {
    // Key-value output that uses fixed-size columns for better readability
    fn write(self, file: &mut impl Write) -> io::Result<()> {
        write!(file, "{:<35}: ", self.0)?;
        self.1.write(file)
    }
}

/// Write a floating-point number using "engineering" notation
///
/// Analogous to the %g format of the C printf function, this method switches
/// between naive and scientific notation for floating-point numbers when the
/// number being printed becomes so small that printing leading zeroes could end
/// up larger than the scientific notation, or so large that we would be forced
/// to print more significant digits than requested.
///
fn write_engineering(writer: &mut impl Write, x: Float, sig_digits: usize) -> io::Result<()> {
    let mut precision = sig_digits - 1;
    if x == 0. {
        // Zero is special because you can't take its log
        write!(writer, "0")
    } else if !x.is_finite() {
        write!(writer, "{x}")
    } else {
        // Otherwise, use log to evaluate order of magnitude
        let log_x = x.abs().log10();
        if (-3. ..=(sig_digits as Float)).contains(&log_x) {
            // Rust's precision counts digits after the decimal point, so it
            // must be adjusted to keep a constant number of significant digits.
            precision = (precision as isize - log_x.trunc() as isize).max(0) as usize;

            // The leading zero of numbers below 1 is not significant
            if log_x < 0. {
                precision += 1
            }

            // Strip trailing zeros, but be careful with integer numbers...
            let str_with_zeros = format!("{x:.precision$}");
            if str_with_zeros.contains('.') {
                write!(
                    writer,
                    "{}",
                    str_with_zeros.trim_end_matches('0').trim_end_matches('.')
                )
            } else {
                write!(writer, "{str_with_zeros}")
            }
        } else {
            // Print using scientific notation
            write!(writer, "{x:.precision$e}")
        }
    }
}
