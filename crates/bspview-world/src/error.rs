// error.rs — load failures and load report entries

use std::path::PathBuf;

use thiserror::Error;

use bspview_common::error::{BspError, MalformedLump};

use crate::disp::DisplacementMismatch;
use crate::entities::EntityParseWarning;
use crate::face::DegenerateFace;
use crate::vis::VisibilityDecodeOverrun;

/// A load that produced no scene.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("couldn't read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not a .bsp file", path.display())]
    NotABspFile { path: PathBuf },

    #[error(transparent)]
    Corrupt(#[from] BspError),

    #[error("load cancelled")]
    Cancelled,
}

/// A non-fatal problem found while loading. The scene is still produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadIssue {
    #[error(transparent)]
    MalformedLump(#[from] MalformedLump),

    #[error(transparent)]
    DegenerateFace(#[from] DegenerateFace),

    #[error(transparent)]
    DisplacementMismatch(#[from] DisplacementMismatch),

    #[error(transparent)]
    VisibilityDecodeOverrun(#[from] VisibilityDecodeOverrun),

    #[error(transparent)]
    EntityParseWarning(#[from] EntityParseWarning),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IssueKind {
    MalformedLump,
    DegenerateFace,
    DisplacementMismatch,
    VisibilityDecodeOverrun,
    EntityParseWarning,
}

impl IssueKind {
    pub const ALL: [IssueKind; 5] = [
        IssueKind::MalformedLump,
        IssueKind::DegenerateFace,
        IssueKind::DisplacementMismatch,
        IssueKind::VisibilityDecodeOverrun,
        IssueKind::EntityParseWarning,
    ];

    pub fn name(self) -> &'static str {
        match self {
            IssueKind::MalformedLump => "malformed lump",
            IssueKind::DegenerateFace => "degenerate face",
            IssueKind::DisplacementMismatch => "displacement mismatch",
            IssueKind::VisibilityDecodeOverrun => "visibility overrun",
            IssueKind::EntityParseWarning => "entity warning",
        }
    }
}

impl LoadIssue {
    pub fn kind(&self) -> IssueKind {
        match self {
            LoadIssue::MalformedLump(_) => IssueKind::MalformedLump,
            LoadIssue::DegenerateFace(_) => IssueKind::DegenerateFace,
            LoadIssue::DisplacementMismatch(_) => IssueKind::DisplacementMismatch,
            LoadIssue::VisibilityDecodeOverrun(_) => IssueKind::VisibilityDecodeOverrun,
            LoadIssue::EntityParseWarning(_) => IssueKind::EntityParseWarning,
        }
    }
}

/// Every non-fatal issue of one load, in pipeline order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    issues: Vec<LoadIssue>,
}

impl LoadReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: impl Into<LoadIssue>) {
        self.issues.push(issue.into());
    }

    pub fn extend<I, T>(&mut self, issues: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<LoadIssue>,
    {
        self.issues.extend(issues.into_iter().map(Into::into));
    }

    pub fn issues(&self) -> &[LoadIssue] {
        &self.issues
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind() == kind).count()
    }

    /// Non-zero counts per kind.
    pub fn counts(&self) -> Vec<(IssueKind, usize)> {
        IssueKind::ALL
            .iter()
            .map(|&k| (k, self.count(k)))
            .filter(|&(_, n)| n > 0)
            .collect()
    }
}
