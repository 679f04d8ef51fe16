//! Mechanism for loading and sharing the selection configuration
//!
//! The configuration file is line-oriented. Each non-blank line holds a key
//! followed by whitespace-separated values, and `#` starts a comment:
//!
//! ```text
//! center_shift 45.7 0
//! on_parallel  skip
//! site near 0     11000
//! site far  49000 60000
//! cut  energy   energy   0.2 5
//! cut  fiducial fiducial near -200 200 -200 200
//! hist oaa_numu numu through:fiducial oaa@near:50:0:0.05
//! ```
//!
//! Sites are declared either by the longitudinal position of a transverse
//! plane or by a full plane (point then normal), followed by the baseline.
//! Cuts are evaluated in the order in which they are declared.

use crate::{
    category::CategorySelector,
    cuts::{Cut, CutSpec, CutState, Threshold},
    error::ConfigurationError,
    features::{Observable, ParallelPolicy},
    histogram::Binning,
    histset::{self, AxisDecl, HistogramDecl},
    linalg::Vector3,
    numeric::Float,
    projection::{DetectorSite, Plane},
    Result,
};
use eyre::WrapErr;
use log::info;
use std::{collections::HashSet, fs, str::FromStr};

/// Selection configuration
#[derive(Debug)]
pub struct Configuration {
    /// Transverse (x, y) position of the detector center relative to the beam
    /// axis, subtracted before computing radial offsets (cm)
    pub center_shift: [Float; 2],

    /// Handling of trajectories parallel to a site's plane
    pub on_parallel: ParallelPolicy,

    /// Detector sites onto which every candidate is projected
    pub sites: Vec<DetectorSite>,

    /// Ordered cuts applied to every candidate
    pub cuts: CutSpec,

    /// Declarations of the histograms to be filled
    pub histograms: Vec<HistogramDecl>,
}
//
impl Configuration {
    /// Assemble a configuration, checking its consistency
    pub fn new(
        center_shift: [Float; 2],
        on_parallel: ParallelPolicy,
        sites: Vec<DetectorSite>,
        cuts: CutSpec,
        histograms: Vec<HistogramDecl>,
    ) -> std::result::Result<Self, ConfigurationError> {
        if !center_shift.iter().all(|x| x.is_finite()) {
            return Err(ConfigurationError::Invalid {
                name: "center_shift".to_owned(),
                reason: "coordinates must be finite".to_owned(),
            });
        }
        if sites.is_empty() {
            return Err(ConfigurationError::Missing("site"));
        }
        let mut names = HashSet::new();
        for site in &sites {
            if !names.insert(site.name()) {
                return Err(ConfigurationError::Duplicate {
                    kind: "site",
                    name: site.name().to_owned(),
                });
            }
        }
        histset::validate_decls(&histograms)?;
        Ok(Self {
            center_shift,
            on_parallel,
            sites,
            cuts,
            histograms,
        })
    }

    /// Load the configuration from a file, check it, and print it out
    pub fn load(file_name: &str) -> Result<Self> {
        let config_str = fs::read_to_string(file_name)
            .wrap_err_with(|| format!("Could not read configuration file {file_name}"))?;
        let config = Self::parse(&config_str)?;
        config.print();
        Ok(config)
    }

    /// Decode a configuration from its textual form
    pub fn parse(config_str: &str) -> std::result::Result<Self, ConfigurationError> {
        // Collect configuration items, ignoring comments and blank lines
        let items = config_str
            .lines()
            .enumerate()
            .filter_map(|(idx, line)| ConfigItem::new(idx + 1, line))
            .collect::<Vec<_>>();
        for item in &items {
            if !KNOWN_KEYS.contains(&item.key) {
                return Err(ConfigurationError::UnknownKey {
                    line: item.line,
                    key: item.key.to_owned(),
                });
            }
        }
        let center_shift = {
            let item = single(&items, "center_shift")?;
            item.expect_values(2)?;
            [item.parse(0)?, item.parse(1)?]
        };

        let on_parallel = {
            let item = single(&items, "on_parallel")?;
            match item.values.first().copied() {
                Some("skip") => {
                    item.expect_values(1)?;
                    ParallelPolicy::Skip
                }
                Some("sentinel") => {
                    item.expect_values(2)?;
                    ParallelPolicy::Sentinel(item.parse(1)?)
                }
                _ => return Err(item.syntax("expected \"skip\" or \"sentinel <value>\"")),
            }
        };

        let sites = with_key(&items, "site")
            .map(ConfigItem::to_site)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let cuts = with_key(&items, "cut")
            .map(|item| item.to_cut(&sites))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let cuts = CutSpec::new(cuts)?;

        let histograms = with_key(&items, "hist")
            .map(|item| item.to_histogram(&sites, &cuts))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Self::new(center_shift, on_parallel, sites, cuts, histograms)
    }

    /// Log the configuration
    pub fn print(&self) {
        info!(
            "center_shift   : {} {}",
            self.center_shift[0], self.center_shift[1]
        );
        info!("on_parallel    : {:?}", self.on_parallel);
        for site in &self.sites {
            let plane = site.plane();
            info!(
                "site {:<10}: point {:?}, normal {:?}, baseline {}",
                site.name(),
                plane.point().as_slice(),
                plane.normal().as_slice(),
                site.baseline()
            );
        }
        for (idx, cut) in self.cuts.iter().enumerate() {
            info!("cut #{:<9}: {}", idx + 1, cut.name());
        }
        for decl in &self.histograms {
            let axes = decl
                .axes
                .iter()
                .map(|a| {
                    format!(
                        "{}:{}:{}:{}",
                        a.observable.describe(&self.sites),
                        a.binning.num_bins,
                        a.binning.low,
                        a.binning.high
                    )
                })
                .collect::<Vec<_>>()
                .join(" ");
            info!(
                "hist {:<10}: {} {} {}",
                decl.name,
                decl.category,
                decl.state.describe(&self.cuts),
                axes
            );
        }
    }
}

/// Configuration items with a given key, in file order
fn with_key<'a, 'data>(
    items: &'a [ConfigItem<'data>],
    key: &'static str,
) -> impl Iterator<Item = &'a ConfigItem<'data>> {
    items.iter().filter(move |item| item.key == key)
}

/// The one configuration item with a given key
fn single<'a, 'data>(
    items: &'a [ConfigItem<'data>],
    key: &'static str,
) -> std::result::Result<&'a ConfigItem<'data>, ConfigurationError> {
    let mut matches = with_key(items, key);
    let item = matches.next().ok_or(ConfigurationError::Missing(key))?;
    if matches.next().is_some() {
        return Err(ConfigurationError::Duplicate {
            kind: "parameter",
            name: key.to_owned(),
        });
    }
    Ok(item)
}

/// Keys which may appear in a configuration file
const KNOWN_KEYS: [&str; 5] = ["center_shift", "on_parallel", "site", "cut", "hist"];

/// A line of the configuration file, tagged with its line number for error
/// reporting purposes
struct ConfigItem<'data> {
    line: usize,
    key: &'data str,
    values: Vec<&'data str>,
}
//
impl<'data> ConfigItem<'data> {
    /// Split a raw line, or return None for blank and comment-only lines
    fn new(line: usize, raw: &'data str) -> Option<Self> {
        let content = raw.split('#').next().unwrap_or("");
        let mut words = content.split_whitespace();
        let key = words.next()?;
        Some(Self {
            line,
            key,
            values: words.collect(),
        })
    }

    /// Build a syntax error pointing to this line
    fn syntax(&self, message: impl Into<String>) -> ConfigurationError {
        ConfigurationError::Syntax {
            line: self.line,
            message: format!("{}: {}", self.key, message.into()),
        }
    }

    /// Check the number of values on this line
    fn expect_values(&self, count: usize) -> std::result::Result<(), ConfigurationError> {
        if self.values.len() == count {
            Ok(())
        } else {
            Err(self.syntax(format!(
                "expected {count} values, got {}",
                self.values.len()
            )))
        }
    }

    /// Parse the idx-th value using Rust's standard parsing logic
    fn parse<T: FromStr>(&self, idx: usize) -> std::result::Result<T, ConfigurationError>
    where
        <T as FromStr>::Err: std::fmt::Display,
    {
        let data = self.values.get(idx).ok_or_else(|| self.syntax("missing value"))?;
        data.parse::<T>()
            .map_err(|e| self.syntax(format!("could not parse \"{data}\": {e}")))
    }

    /// site <name> <plane_z> <baseline>
    /// site <name> <px> <py> <pz> <nx> <ny> <nz> <baseline>
    fn to_site(&self) -> std::result::Result<DetectorSite, ConfigurationError> {
        let (plane, baseline) = match self.values.len() {
            3 => (Plane::transverse(self.parse(1)?), self.parse(2)?),
            8 => {
                let point = Vector3::new(self.parse(1)?, self.parse(2)?, self.parse(3)?);
                let normal = Vector3::new(self.parse(4)?, self.parse(5)?, self.parse(6)?);
                (Plane::new(point, normal)?, self.parse(7)?)
            }
            n => return Err(self.syntax(format!("expected 3 or 8 values, got {n}"))),
        };
        DetectorSite::new(self.values[0], plane, baseline)
    }

    /// cut <name> <kind> <args...>
    fn to_cut(&self, sites: &[DetectorSite]) -> std::result::Result<Cut, ConfigurationError> {
        if self.values.len() < 2 {
            return Err(self.syntax("expected a cut name and a cut kind"));
        }
        let threshold = Threshold::parse(self.values[1], &self.values[2..], sites)?;
        Ok(Cut::threshold(self.values[0], threshold))
    }

    /// hist <name> <category> <cut state> <observable>:<bins>:<low>:<high>...
    fn to_histogram(
        &self,
        sites: &[DetectorSite],
        cuts: &CutSpec,
    ) -> std::result::Result<HistogramDecl, ConfigurationError> {
        if self.values.len() < 4 {
            return Err(self.syntax("expected a name, a category, a cut state and axes"));
        }
        let axes = self.values[3..]
            .iter()
            .map(|axis| {
                let fields = axis.split(':').collect::<Vec<_>>();
                let [observable, num_bins, low, high] = fields[..] else {
                    return Err(self.syntax(format!(
                        "axis \"{axis}\" should read <observable>:<bins>:<low>:<high>"
                    )));
                };
                let number = |s: &str| {
                    s.parse::<Float>()
                        .map_err(|e| self.syntax(format!("could not parse \"{s}\": {e}")))
                };
                let num_bins = num_bins
                    .parse::<usize>()
                    .map_err(|e| self.syntax(format!("could not parse \"{num_bins}\": {e}")))?;
                Ok(AxisDecl {
                    observable: Observable::parse(observable, sites)?,
                    binning: Binning::new(num_bins, number(low)?, number(high)?)?,
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(HistogramDecl {
            name: self.values[0].to_owned(),
            category: self.values[1].parse::<CategorySelector>()?,
            state: CutState::parse(self.values[2], cuts)?,
            axes,
        })
    }
}
