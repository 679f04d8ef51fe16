//! Physical categories into which candidates are sorted

use crate::error::ConfigurationError;
use serde::Serialize;
use std::{fmt, str::FromStr};

/// Physical category of a candidate
///
/// Every particle type maps to exactly one category, so per-category totals
/// always add up to the total number of candidates.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum Category {
    NuE,
    NuEBar,
    NuMu,
    NuMuBar,
    NuTau,
    NuTauBar,
    Other,
}
//
impl Category {
    /// Number of categories
    pub const COUNT: usize = 7;

    /// All categories, in storage order
    pub const ALL: [Category; Self::COUNT] = [
        Category::NuE,
        Category::NuEBar,
        Category::NuMu,
        Category::NuMuBar,
        Category::NuTau,
        Category::NuTauBar,
        Category::Other,
    ];

    /// Sort a particle into its category using its PDG code
    pub fn from_pdg(pdg: i32) -> Self {
        match pdg {
            12 => Category::NuE,
            -12 => Category::NuEBar,
            14 => Category::NuMu,
            -14 => Category::NuMuBar,
            16 => Category::NuTau,
            -16 => Category::NuTauBar,
            _ => Category::Other,
        }
    }

    /// Position of this category in per-category storage
    pub fn index(self) -> usize {
        self as usize
    }

    /// Short name used in configuration and output files
    pub fn name(self) -> &'static str {
        match self {
            Category::NuE => "nue",
            Category::NuEBar => "nuebar",
            Category::NuMu => "numu",
            Category::NuMuBar => "numubar",
            Category::NuTau => "nutau",
            Category::NuTauBar => "nutaubar",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which categories a histogram applies to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CategorySelector {
    /// Every candidate
    All,

    /// Candidates of one category only
    Only(Category),
}
//
impl CategorySelector {
    /// Truth that a candidate of this category should be histogrammed
    pub fn accepts(self, category: Category) -> bool {
        match self {
            CategorySelector::All => true,
            CategorySelector::Only(c) => c == category,
        }
    }
}

impl FromStr for CategorySelector {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            return Ok(CategorySelector::All);
        }
        Category::ALL
            .iter()
            .find(|c| c.name() == s)
            .map(|&c| CategorySelector::Only(c))
            .ok_or_else(|| ConfigurationError::UnknownReference {
                kind: "category",
                name: s.to_owned(),
            })
    }
}

impl fmt::Display for CategorySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategorySelector::All => f.write_str("all"),
            CategorySelector::Only(c) => f.write_str(c.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_partition_pdg_codes() {
        for pdg in -20..=20 {
            let cat = Category::from_pdg(pdg);
            let accepted = Category::ALL
                .iter()
                .filter(|&&c| CategorySelector::Only(c).accepts(cat))
                .count();
            assert_eq!(accepted, 1, "pdg {pdg} should belong to one category");
        }
    }

    #[test]
    fn storage_order_matches_index() {
        for (idx, cat) in Category::ALL.iter().enumerate() {
            assert_eq!(cat.index(), idx);
        }
    }

    #[test]
    fn selectors_round_trip_through_names() {
        for cat in Category::ALL {
            let sel: CategorySelector = cat.name().parse().unwrap();
            assert_eq!(sel, CategorySelector::Only(cat));
        }
        assert_eq!("all".parse(), Ok(CategorySelector::All));
        assert!("numuu".parse::<CategorySelector>().is_err());
    }
}
