use crate::theme::ThemeFile;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Update => write!(f, "update"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}

/// One unit of upload work. Two operations are equal when kind and relative path match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Operation {
    pub kind: OperationKind,
    pub file: ThemeFile,
}

impl Operation {
    pub fn new(kind: OperationKind, file: ThemeFile) -> Self {
        Operation { kind, file }
    }

    pub fn update(file: ThemeFile) -> Self {
        Operation::new(OperationKind::Update, file)
    }

    pub fn delete(file: ThemeFile) -> Self {
        Operation::new(OperationKind::Delete, file)
    }
}

/// `update assets/theme.css`
impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.file.key())
    }
}
