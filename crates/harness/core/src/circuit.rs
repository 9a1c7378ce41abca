use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Role;

/// Extension of circuit description and input files.
pub const CIRCUIT_EXTENSION: &str = ".txt";
/// Character reserved for per-party input files, e.g. `add-input-1.txt`.
pub const INPUT_SEPARATOR: char = '-';

/// A runnable circuit test case.
///
/// All paths are derived from the name and the circuits directory:
/// `<dir>/<name>.txt` for the description and `<dir>/<name>-input-<i>.txt`
/// for each party's input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CircuitCase {
    name: String,
    dir: PathBuf,
}

impl CircuitCase {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
        }
    }

    /// Returns the case for a file in the circuits directory, or `None` if the
    /// file is not a circuit description.
    pub fn from_file_name(file_name: &str, dir: &Path) -> Option<Self> {
        let name = file_name.strip_suffix(CIRCUIT_EXTENSION)?;
        if name.is_empty() || name.contains(INPUT_SEPARATOR) {
            return None;
        }

        Some(Self::new(name, dir))
    }

    /// Returns the circuit name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the circuit description path.
    pub fn circuit_path(&self) -> PathBuf {
        self.dir.join(format!("{}{CIRCUIT_EXTENSION}", self.name))
    }

    /// Returns the input path of the given party.
    pub fn input_path(&self, role: Role) -> PathBuf {
        self.dir.join(format!(
            "{}{INPUT_SEPARATOR}input{INPUT_SEPARATOR}{}{CIRCUIT_EXTENSION}",
            self.name,
            role.input_index()
        ))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::description("add.txt", Some("add"))]
    #[case::underscore("mult_64.txt", Some("mult_64"))]
    #[case::garbler_input("add-input-1.txt", None)]
    #[case::evaluator_input("add-input-2.txt", None)]
    #[case::other_extension("add.bristol", None)]
    #[case::bare_extension(".txt", None)]
    fn test_from_file_name(#[case] file_name: &str, #[case] expected: Option<&str>) {
        let case = CircuitCase::from_file_name(file_name, Path::new("circuits"));
        assert_eq!(case.as_ref().map(CircuitCase::name), expected);
    }

    #[test]
    fn test_paths() {
        let case = CircuitCase::new("add", "/proj/circuits");

        assert_eq!(case.circuit_path(), PathBuf::from("/proj/circuits/add.txt"));
        assert_eq!(
            case.input_path(Role::Garbler),
            PathBuf::from("/proj/circuits/add-input-1.txt")
        );
        assert_eq!(
            case.input_path(Role::Evaluator),
            PathBuf::from("/proj/circuits/add-input-2.txt")
        );
    }
}
