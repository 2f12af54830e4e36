//! Safety checks run before any cache file is overwritten.
//!
//! Both caches are rewritten wholesale at the end of a run, so a cache path
//! pointing at an operator-maintained input would silently destroy it.

use anyhow::{bail, Result};
use std::path::Path;

/// Validates that a cache path is safe to overwrite.
///
/// Checks:
/// - The file name ends in `.json` and contains `cache`
/// - The path is not one of the run's inputs
pub fn validate_cache_path(cache: &Path, inputs: &[&Path]) -> Result<()> {
    let name = cache.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if !name.ends_with(".json") {
        bail!("Safety check failed: cache file '{}' must be a .json file", cache.display());
    }
    if !name.contains("cache") {
        bail!(
            "Safety check failed: cache file '{}' must contain 'cache' in the name",
            cache.display()
        );
    }

    for input in inputs {
        if cache == *input {
            bail!(
                "Safety check failed: cache '{}' cannot be the same as input '{}'",
                cache.display(),
                input.display()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_names_pass() {
        let structure = PathBuf::from("config/structure.json");
        assert!(validate_cache_path(Path::new(".fuzz_cache.json"), &[&structure]).is_ok());
        assert!(validate_cache_path(Path::new(".cache.json"), &[&structure]).is_ok());
    }

    #[test]
    fn test_missing_pattern() {
        let result = validate_cache_path(Path::new("results.json"), &[]);
        assert!(result.unwrap_err().to_string().contains("must contain 'cache'"));
    }

    #[test]
    fn test_wrong_extension() {
        assert!(validate_cache_path(Path::new("cache.txt"), &[]).is_err());
    }

    #[test]
    fn test_cache_equals_input() {
        let path = PathBuf::from("config/cache_structure.json");
        let result = validate_cache_path(&path, &[&path]);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("cannot be the same as input"));
    }
}
