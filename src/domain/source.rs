// Source descriptors: where a card's raw table comes from
use super::error::{DashboardError, DashboardResult};
use super::table::Scalar;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::PathBuf;

/// Identifies a data origin; immutable once the dashboard is defined
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    #[serde(flatten)]
    pub locator: Locator,
    /// Column count the result must have, checked by the adapter
    #[serde(default)]
    pub expected_columns: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    Query {
        sql: String,
        #[serde(default)]
        params: Vec<Scalar>,
    },
    File {
        path: PathBuf,
        #[serde(flatten)]
        format: FileFormat,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum FileFormat {
    Delimited {
        #[serde(default)]
        delimiter: Option<String>,
        #[serde(default = "default_true")]
        has_header: bool,
    },
    Spreadsheet {
        #[serde(default)]
        sheet: Option<String>,
        #[serde(default = "default_true")]
        has_header: bool,
        /// Half-open window over data rows (after the header)
        #[serde(default)]
        rows: Option<RowWindow>,
    },
    Records,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowWindow {
    pub start: usize,
    pub end: usize,
}

fn default_true() -> bool {
    true
}

impl SourceDescriptor {
    pub fn query(sql: impl Into<String>, params: Vec<Scalar>) -> Self {
        Self {
            locator: Locator::Query {
                sql: sql.into(),
                params,
            },
            expected_columns: None,
        }
    }

    pub fn file(path: impl Into<PathBuf>, format: FileFormat) -> Self {
        Self {
            locator: Locator::File {
                path: path.into(),
                format,
            },
            expected_columns: None,
        }
    }

    pub fn with_expected_columns(mut self, count: usize) -> Self {
        self.expected_columns = Some(count);
        self
    }

    pub fn kind(&self) -> &'static str {
        match self.locator {
            Locator::Query { .. } => "query",
            Locator::File { .. } => "file",
        }
    }

    /// Cache identity: kind, locator, bind parameters and format options
    pub fn cache_key(&self) -> String {
        let mut key = String::from(self.kind());
        match &self.locator {
            Locator::Query { sql, params } => {
                let _ = write!(key, "|{}", sql.trim());
                for param in params {
                    let _ = match param {
                        Scalar::Null => write!(key, "|null"),
                        Scalar::Number(n) => write!(key, "|n:{}", n),
                        Scalar::Text(s) => write!(key, "|s:{}", s),
                    };
                }
            }
            Locator::File { path, format } => {
                let _ = write!(key, "|{}|{:?}", path.display(), format);
            }
        }
        if let Some(n) = self.expected_columns {
            let _ = write!(key, "|cols={}", n);
        }
        key
    }

    /// Structural checks run once at startup
    pub fn validate(&self) -> DashboardResult<()> {
        match &self.locator {
            Locator::Query { sql, params } => {
                if sql.trim().is_empty() {
                    return Err(DashboardError::configuration("query text is empty"));
                }
                let placeholders = placeholder_count(sql);
                if placeholders != params.len() {
                    return Err(DashboardError::configuration(format!(
                        "query has {} placeholders but {} bind parameters",
                        placeholders,
                        params.len()
                    )));
                }
            }
            Locator::File { path, format } => {
                if path.as_os_str().is_empty() {
                    return Err(DashboardError::configuration("file path is empty"));
                }
                match format {
                    FileFormat::Delimited {
                        delimiter: Some(d), ..
                    } if d.chars().count() != 1 => {
                        return Err(DashboardError::configuration(format!(
                            "delimiter must be a single character, got {:?}",
                            d
                        )));
                    }
                    FileFormat::Spreadsheet {
                        rows: Some(window), ..
                    } if window.start > window.end => {
                        return Err(DashboardError::configuration(format!(
                            "row window {}..{} is reversed",
                            window.start, window.end
                        )));
                    }
                    _ => {}
                }
            }
        }
        if self.expected_columns == Some(0) {
            return Err(DashboardError::configuration("expected_columns must be positive"));
        }
        Ok(())
    }
}

/// Bind slots in `sql`, numbered the way SQLite numbers them: `?` takes the
/// next index, `?NNN` names one, each distinct `:name`/`@name`/`$name` takes
/// one. Quoted text and comments are skipped.
fn placeholder_count(sql: &str) -> usize {
    let mut chars = sql.chars().peekable();
    let mut highest = 0;
    let mut names = HashSet::new();
    while let Some(c) = chars.next() {
        match c {
            // A doubled quote closes and reopens, which lands in the same state
            '\'' | '"' | '`' => {
                for inner in chars.by_ref() {
                    if inner == c {
                        break;
                    }
                }
            }
            '[' => {
                for inner in chars.by_ref() {
                    if inner == ']' {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for inner in chars.by_ref() {
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
            }
            '?' => {
                let mut digits = String::new();
                while let Some(d) = chars.next_if(|d| d.is_ascii_digit()) {
                    digits.push(d);
                }
                highest = match digits.parse::<usize>() {
                    Ok(index) => highest.max(index),
                    Err(_) => highest + 1,
                };
            }
            ':' | '@' | '$' => {
                let mut name = String::new();
                while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                    name.push(ch);
                }
                if !name.is_empty() && names.insert(name) {
                    highest += 1;
                }
            }
            _ => {}
        }
    }
    highest
}
