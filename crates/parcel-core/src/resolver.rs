//! Mapping source globs onto files and package paths.
//!
//! A manifest `<file src="..." target="..."/>` entry names files relative to a
//! base directory with a restricted glob syntax: `*` within one directory and
//! `**` for "this directory and everything below". Both `\` and `/` are
//! accepted as separators.
//!
//! Package paths (the location of a file inside the archive) always use `\`
//! and never start with a separator.

use std::io;
use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern};
use tracing::debug;

use crate::fs::{FileSystem, SearchOption};

/// Separator used in package paths.
pub const PACKAGE_PATH_SEPARATOR: char = '\\';

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Where and how to look for the files a source pattern names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSearchFilter {
    /// Absolute directory the search starts in.
    pub search_directory: PathBuf,
    /// File name pattern, or a pattern over the path relative to the search
    /// directory when it contains `/`.
    pub search_pattern: String,
    /// Whether to descend into subdirectories.
    pub search_option: SearchOption,
    /// Whether the source contained a wildcard.
    pub is_wildcard_search: bool,
}

impl PathSearchFilter {
    /// Whether `file` (somewhere under the search directory) matches the
    /// pattern.
    pub fn matches(&self, file: &Path) -> bool {
        if !self.is_wildcard_search {
            return file
                .file_name()
                .is_some_and(|name| {
                    name.to_string_lossy()
                        .eq_ignore_ascii_case(&self.search_pattern)
                });
        }
        if self.search_pattern == "*.*" || self.search_pattern == "*" {
            return true;
        }
        let Ok(pattern) = Pattern::new(&self.search_pattern) else {
            return false;
        };
        if self.search_pattern.contains('/') {
            file.strip_prefix(&self.search_directory)
                .is_ok_and(|relative| pattern.matches_path_with(relative, MATCH_OPTIONS))
        } else {
            file.file_name().is_some_and(|name| {
                pattern.matches_with(&name.to_string_lossy(), MATCH_OPTIONS)
            })
        }
    }
}

/// Turn a source pattern into a search filter rooted at `base_path`.
///
/// ```
/// use std::path::Path;
/// use parcel_core::fs::SearchOption;
/// use parcel_core::resolver::resolve_search_filter;
///
/// let filter = resolve_search_filter(Path::new("/work"), r"content\**\*.txt");
/// assert_eq!(filter.search_directory, Path::new("/work/content"));
/// assert_eq!(filter.search_pattern, "*.txt");
/// assert_eq!(filter.search_option, SearchOption::AllDirectories);
///
/// let filter = resolve_search_filter(Path::new("/work"), "lib/*/Sample.dll");
/// assert_eq!(filter.search_directory, Path::new("/work/lib"));
/// assert_eq!(filter.search_pattern, "*/Sample.dll");
/// assert!(filter.is_wildcard_search);
/// ```
pub fn resolve_search_filter(base_path: &Path, source: &str) -> PathSearchFilter {
    let source = source.trim().replace('\\', "/");

    let is_wildcard_search = source.contains('*');
    let (directory, search_pattern, search_option) = if let Some(index) = source.find("**") {
        let rest = source[index + 2..].trim_start_matches('/');
        let pattern = if rest.is_empty() {
            "*".to_string()
        } else if rest.contains('/') {
            format!("**/{rest}")
        } else {
            rest.to_string()
        };
        (&source[..index], pattern, SearchOption::AllDirectories)
    } else {
        let (directory, file) = source.rsplit_once('/').unwrap_or(("", source.as_str()));
        match directory.find('*') {
            // The search starts above the first directory segment holding a
            // wildcard and the rest is matched as a relative path
            Some(star) => {
                let split = directory[..star].rfind('/').map_or(0, |i| i + 1);
                (
                    &source[..split],
                    source[split..].to_string(),
                    SearchOption::AllDirectories,
                )
            }
            None => (directory, file.to_string(), SearchOption::TopDirectoryOnly),
        }
    };

    let filter = PathSearchFilter {
        search_directory: normalize_path(&base_path.join(directory)),
        search_pattern,
        search_option,
        is_wildcard_search,
    };
    debug!(?filter, "resolved search filter");
    filter
}

/// Compute the package path for `file`, found through `filter`, placed under
/// `target`.
///
/// - A non-wildcard source whose extension matches the target's is renamed to
///   the target itself.
/// - A file under the search directory keeps its path relative to it.
/// - Anything else keeps only its file name.
///
/// ```
/// use std::path::Path;
/// use parcel_core::resolver::{resolve_package_path, resolve_search_filter};
///
/// let filter = resolve_search_filter(Path::new("/work"), r"ie\css\style.css");
/// let file = Path::new("/work/ie/css/style.css");
/// let path = resolve_package_path(&filter, file, r"Content\css\ie.css");
/// assert_eq!(path, r"Content\css\ie.css");
/// ```
pub fn resolve_package_path(filter: &PathSearchFilter, file: &Path, target: &str) -> String {
    let target = to_package_path(target);
    let file_text = to_package_path(&file.to_string_lossy());

    if !filter.is_wildcard_search
        && !target.is_empty()
        && extension(&file_text).eq_ignore_ascii_case(extension(&target))
    {
        return target;
    }

    let directory = to_package_path(&filter.search_directory.to_string_lossy());
    if let Some(relative) = strip_prefix_ignore_case(&file_text, &directory) {
        return join_package_path(&target, relative);
    }

    let name = file_text
        .rsplit(PACKAGE_PATH_SEPARATOR)
        .next()
        .unwrap_or(file_text.as_str());
    join_package_path(&target, name)
}

/// Find every file the filter matches.
///
/// # Errors
///
/// Returns an I/O error if the search directory cannot be listed.
pub fn search_files(fs: &dyn FileSystem, filter: &PathSearchFilter) -> io::Result<Vec<PathBuf>> {
    let files: Vec<PathBuf> = fs
        .enumerate(&filter.search_directory, filter.search_option)?
        .into_iter()
        .filter(|file| filter.matches(file))
        .collect();
    debug!(
        directory = %filter.search_directory.display(),
        pattern = %filter.search_pattern,
        count = files.len(),
        "matched files"
    );
    Ok(files)
}

/// Compiled `exclude` globs, relative to a base directory.
#[derive(Debug, Clone, Default)]
pub struct ExcludeFilter {
    patterns: Vec<Pattern>,
}

impl ExcludeFilter {
    /// Compile `;`-separated globs relative to `base_path`.
    ///
    /// Glob characters in `base_path` itself match literally. Globs that do
    /// not compile are ignored.
    pub fn new(base_path: &Path, exclude: Option<&str>) -> Self {
        let base = base_path.to_string_lossy().replace('\\', "/");
        let base = Pattern::escape(base.trim_end_matches('/'));
        let patterns = exclude
            .unwrap_or_default()
            .split(';')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .filter_map(|p| {
                let glob = format!("{base}/{}", p.replace('\\', "/").trim_start_matches('/'));
                Pattern::new(&glob).ok()
            })
            .collect();
        Self { patterns }
    }

    /// Whether `file` matches any exclude glob.
    pub fn is_excluded(&self, file: &Path) -> bool {
        let path = PathBuf::from(file.to_string_lossy().replace('\\', "/"));
        self.patterns
            .iter()
            .any(|pattern| pattern.matches_path_with(&path, MATCH_OPTIONS))
    }
}

/// Resolve `.` and `..` components without touching the file system.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => normalized.push(component),
            },
            other => normalized.push(other),
        }
    }
    normalized
}

/// Convert `/` separators to `\` and drop leading and trailing separators.
pub fn to_package_path(path: &str) -> String {
    path.replace('/', "\\")
        .trim_matches(PACKAGE_PATH_SEPARATOR)
        .to_string()
}

fn join_package_path(target: &str, relative: &str) -> String {
    let relative = relative.trim_start_matches(PACKAGE_PATH_SEPARATOR);
    if target.is_empty() {
        relative.to_string()
    } else {
        format!("{target}{PACKAGE_PATH_SEPARATOR}{relative}")
    }
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    let rest = &text[prefix.len()..];
    (prefix.is_empty() || rest.starts_with(PACKAGE_PATH_SEPARATOR)).then_some(rest)
}

fn extension(path: &str) -> &str {
    let name = path.rsplit(PACKAGE_PATH_SEPARATOR).next().unwrap_or(path);
    match name.rfind('.') {
        Some(index) if index > 0 => &name[index..],
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(directory: &str, pattern: &str, wildcard: bool) -> PathSearchFilter {
        PathSearchFilter {
            search_directory: PathBuf::from(directory),
            search_pattern: pattern.to_string(),
            search_option: SearchOption::TopDirectoryOnly,
            is_wildcard_search: wildcard,
        }
    }

    #[test]
    fn test_recursive_glob() {
        let f = resolve_search_filter(Path::new("/base"), r"content\**\*.txt");
        assert_eq!(f.search_directory, PathBuf::from("/base/content"));
        assert_eq!(f.search_pattern, "*.txt");
        assert_eq!(f.search_option, SearchOption::AllDirectories);
        assert!(f.is_wildcard_search);
    }

    #[test]
    fn test_plain_file() {
        let f = resolve_search_filter(Path::new("/base"), "readme.txt");
        assert_eq!(f.search_directory, PathBuf::from("/base"));
        assert_eq!(f.search_pattern, "readme.txt");
        assert_eq!(f.search_option, SearchOption::TopDirectoryOnly);
        assert!(!f.is_wildcard_search);
    }

    #[test]
    fn test_single_level_wildcard_and_parent_dirs() {
        let f = resolve_search_filter(Path::new("/base/src"), "../bin/*.dll");
        assert_eq!(f.search_directory, PathBuf::from("/base/bin"));
        assert_eq!(f.search_pattern, "*.dll");
        assert_eq!(f.search_option, SearchOption::TopDirectoryOnly);
        assert!(f.is_wildcard_search);
    }

    #[test]
    fn test_trailing_double_star_matches_everything() {
        let f = resolve_search_filter(Path::new("/base"), "tools/**");
        assert_eq!(f.search_directory, PathBuf::from("/base/tools"));
        assert_eq!(f.search_pattern, "*");
        assert!(f.matches(Path::new("/base/tools/a/b/c")));
    }

    #[test]
    fn test_pattern_matching() {
        let f = resolve_search_filter(Path::new("/base"), "**/*.DLL");
        assert!(f.matches(Path::new("/base/lib/a.dll")));
        assert!(!f.matches(Path::new("/base/lib/a.pdb")));

        let f = resolve_search_filter(Path::new("/base"), "**/*.*");
        assert!(f.matches(Path::new("/base/LICENSE")));

        let f = resolve_search_filter(Path::new("/base"), "**/lib/*.dll");
        assert!(f.matches(Path::new("/base/lib/a.dll")));
        assert!(f.matches(Path::new("/base/src/lib/a.dll")));
        assert!(!f.matches(Path::new("/base/other/a.dll")));
    }

    #[test]
    fn test_extension_match_uses_target_verbatim() {
        let f = filter("/base/ie/css", "style.css", false);
        let file = Path::new("/base/ie/css/style.css");
        let path = resolve_package_path(&f, file, r"Content\css\ie.css");
        assert_eq!(path, r"Content\css\ie.css");
    }

    #[test]
    fn test_relative_portion_under_search_directory() {
        let f = filter(r"X:\foo", "*.cs", true);
        let path = resolve_package_path(&f, Path::new(r"X:\foo\bar\boz.cs"), "src");
        assert_eq!(path, r"src\bar\boz.cs");

        let f = filter("/base/content", "*.txt", true);
        let path = resolve_package_path(&f, Path::new("/base/content/a/b.txt"), "");
        assert_eq!(path, r"a\b.txt");
    }

    #[test]
    fn test_prefix_match_is_case_insensitive() {
        let f = filter(r"X:\Foo", "*.cs", true);
        let path = resolve_package_path(&f, Path::new(r"x:\foo\bar\boz.cs"), r"src\");
        assert_eq!(path, r"src\bar\boz.cs");
    }

    #[test]
    fn test_fallback_keeps_file_name_only() {
        let f = filter(r"X:\other", "*.cs", true);
        let path = resolve_package_path(&f, Path::new(r"X:\foo\bar\boz.cs"), "src");
        assert_eq!(path, r"src\boz.cs");

        // A sibling directory sharing a name prefix is not "under" the search
        // directory.
        let f = filter(r"X:\foo", "*.cs", true);
        let path = resolve_package_path(&f, Path::new(r"X:\foobar\boz.cs"), "src");
        assert_eq!(path, r"src\boz.cs");
    }

    #[test]
    fn test_non_wildcard_into_directory_target() {
        let f = resolve_search_filter(Path::new("/base"), r"lib\net45\Sample.dll");
        let path = resolve_package_path(&f, Path::new("/base/lib/net45/Sample.dll"), r"lib\net45");
        assert_eq!(path, r"lib\net45\Sample.dll");
    }

    #[test]
    fn test_exclude_filter() {
        let exclude = ExcludeFilter::new(Path::new("/base"), Some(r"**\*.pdb; bin\secret.txt"));
        assert!(exclude.is_excluded(Path::new("/base/bin/debug/a.PDB")));
        assert!(exclude.is_excluded(Path::new("/base/bin/secret.txt")));
        assert!(!exclude.is_excluded(Path::new("/base/bin/a.dll")));
        assert!(!ExcludeFilter::new(Path::new("/base"), None).is_excluded(Path::new("/base/a")));
    }

    #[test]
    fn test_exclude_base_with_glob_characters() {
        let base = Path::new("/tmp/proj[1]");
        let exclude = ExcludeFilter::new(base, Some("**/*.pdb"));
        assert!(exclude.is_excluded(Path::new("/tmp/proj[1]/bin/a.pdb")));
        assert!(exclude.is_excluded(Path::new("/tmp/proj[1]/a.pdb")));
        assert!(!exclude.is_excluded(Path::new("/tmp/proj1/bin/a.pdb")));
        assert!(!exclude.is_excluded(Path::new("/tmp/proj[1]/bin/a.dll")));

        let exclude = ExcludeFilter::new(Path::new("/tmp/*"), Some("a.txt"));
        assert!(exclude.is_excluded(Path::new("/tmp/*/a.txt")));
        assert!(!exclude.is_excluded(Path::new("/tmp/other/a.txt")));
    }

    #[test]
    fn test_wildcard_directory_segment() {
        let f = resolve_search_filter(Path::new("/base"), r"lib\*\Sample.dll");
        assert_eq!(f.search_directory, PathBuf::from("/base/lib"));
        assert_eq!(f.search_pattern, "*/Sample.dll");
        assert_eq!(f.search_option, SearchOption::AllDirectories);
        assert!(f.is_wildcard_search);
        assert!(f.matches(Path::new("/base/lib/net45/Sample.dll")));
        assert!(f.matches(Path::new("/base/lib/NET40/sample.DLL")));
        assert!(!f.matches(Path::new("/base/lib/Sample.dll")));
        assert!(!f.matches(Path::new("/base/lib/net45/sub/Sample.dll")));

        let path = resolve_package_path(&f, Path::new("/base/lib/net45/Sample.dll"), "lib");
        assert_eq!(path, r"lib\net45\Sample.dll");

        let f = resolve_search_filter(Path::new("/base"), "*/readme.txt");
        assert_eq!(f.search_directory, PathBuf::from("/base"));
        assert!(f.matches(Path::new("/base/docs/readme.txt")));
        assert!(!f.matches(Path::new("/base/readme.txt")));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize_path(Path::new("a/../../b")), PathBuf::from("../b"));
        assert_eq!(normalize_path(Path::new("../../b")), PathBuf::from("../../b"));
        assert_eq!(normalize_path(Path::new("/../b")), PathBuf::from("/b"));
    }

    #[test]
    fn test_package_path_separators() {
        assert_eq!(to_package_path("/lib/net45/"), r"lib\net45");
        assert_eq!(extension(r"lib\net45"), "");
        assert_eq!(extension(r"a\.hidden"), "");
        assert_eq!(extension(r"a\b.Dll"), ".Dll");
    }
}
