//! Utility functions and helpers

use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

/// Folder names usable as a custom element tag once `_` becomes `-`
static CUSTOM_ELEMENT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9]+(_[a-zA-Z0-9]+)+$").unwrap());

/// Number of lines shown on each side of the failing line in a source frame
const FRAME_WINDOW: usize = 5;

/// Lexically clean a path by removing `.` and resolving `..` components
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }

    normalized
}

/// Make a path absolute against the current directory, then clean it
pub fn absolutize(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(normalize_path(path))
    } else {
        Ok(normalize_path(&std::env::current_dir()?.join(path)))
    }
}

/// Render a path with forward slashes, as used in import specifiers
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
        .replace("//", "/")
}

/// Get relative path from base to target
pub fn relative_path(from: &Path, to: &Path) -> Option<String> {
    pathdiff::diff_paths(normalize_path(to), normalize_path(from)).map(|p| to_slash(&p))
}

/// Relative path usable as an ES module specifier (always starts with `.`)
pub fn relative_specifier(from: &Path, to: &Path) -> Option<String> {
    relative_path(from, to).map(|path| {
        if path.starts_with('.') {
            path
        } else {
            format!("./{}", path)
        }
    })
}

/// Last path segment as an owned string
pub fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|name| name.to_string_lossy().into_owned())
}

/// Check whether a folder name follows the `my_awesome_component` convention
pub fn is_custom_element_name(name: &str) -> bool {
    CUSTOM_ELEMENT_NAME.is_match(name)
}

/// Derive the custom element tag from a component folder name
pub fn custom_element_tag(folder_name: &str) -> String {
    folder_name.replace('_', "-").to_lowercase()
}

/// 1-based line and 0-based column (in chars) of a byte offset
pub fn line_column(code: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(code.len());
    let before = &code[..floor_char_boundary(code, offset)];
    let line = before.matches('\n').count() + 1;
    let column = before
        .rsplit('\n')
        .next()
        .map(|tail| tail.chars().count())
        .unwrap_or(0);

    (line, column)
}

fn floor_char_boundary(code: &str, mut offset: usize) -> usize {
    while !code.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

/// Render a line-numbered excerpt around `line` with a caret under `column`
pub fn source_frame(code: &str, line: usize, column: usize) -> String {
    let width = (line + FRAME_WINDOW).to_string().len();
    let zero_based = line.saturating_sub(1);
    let lines: Vec<&str> = code.split('\n').collect();

    let first = zero_based.saturating_sub(FRAME_WINDOW);
    let previous = &lines[first.min(lines.len())..zero_based.min(lines.len())];
    let next_start = (zero_based + 1).min(lines.len());
    let next = &lines[next_start..(zero_based + 1 + FRAME_WINDOW).min(lines.len())];

    let numbered = |number: usize, content: &str| {
        format!("  {:0width$} │ {}", number, content, width = width)
    };

    let previous = previous
        .iter()
        .enumerate()
        .map(|(index, content)| numbered(first + index + 1, content))
        .collect::<Vec<_>>()
        .join("\n");

    let next = next
        .iter()
        .enumerate()
        .map(|(index, content)| numbered(line + index + 1, content))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}\n▶ {:0width$} │ {}\n  {}   {}▲\n{}",
        previous,
        line,
        lines.get(zero_based).copied().unwrap_or_default(),
        " ".repeat(width),
        " ".repeat(column),
        next,
        width = width
    )
}

/// Format bytes as human-readable size
pub fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;
    const GB: usize = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format duration as human-readable string
pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs_f64();

    if secs >= 60.0 {
        let mins = (secs / 60.0).floor() as u64;
        let remaining_secs = secs - (mins as f64 * 60.0);
        format!("{}m {:.2}s", mins, remaining_secs)
    } else if secs >= 1.0 {
        format!("{:.2}s", secs)
    } else {
        format!("{:.0}ms", secs * 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("./foo/bar")), PathBuf::from("foo/bar"));
        assert_eq!(normalize_path(Path::new("foo/../bar")), PathBuf::from("bar"));
        assert_eq!(
            normalize_path(Path::new("/foo/./bar/../baz")),
            PathBuf::from("/foo/baz")
        );
        assert_eq!(normalize_path(Path::new("../x")), PathBuf::from("../x"));
    }

    #[test]
    fn test_relative_specifier() {
        assert_eq!(
            relative_specifier(Path::new("/out/main"), Path::new("/out/main/lib/a.js")).unwrap(),
            "./lib/a.js"
        );
        assert_eq!(
            relative_specifier(Path::new("/out/main"), Path::new("/out/--/a.js")).unwrap(),
            "../--/a.js"
        );
    }

    #[test]
    fn test_custom_element_names() {
        assert!(is_custom_element_name("the_best_component"));
        assert!(!is_custom_element_name("mal-formed_component"));
        assert!(!is_custom_element_name("single"));
        assert_eq!(custom_element_tag("The_Best_component"), "the-best-component");
    }

    #[test]
    fn test_line_column() {
        let code = "let a\nlet b = é;\n";
        assert_eq!(line_column(code, 0), (1, 0));
        assert_eq!(line_column(code, 6), (2, 0));
        assert_eq!(line_column(code, code.find(';').unwrap()), (2, 9));
    }

    #[test]
    fn test_source_frame() {
        let code = "a\nb\nc\nd\ne\nf\ng\nh";
        let frame = source_frame(code, 7, 2);

        assert_eq!(
            frame,
            "  02 │ b\n  03 │ c\n  04 │ d\n  05 │ e\n  06 │ f\n▶ 07 │ g\n         ▲\n  08 │ h"
        );
    }

    #[test]
    fn test_source_frame_first_line() {
        let frame = source_frame("import {", 1, 8);
        assert_eq!(frame, "\n▶ 1 │ import {\n              ▲\n");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1048576), "1.00 MB");
    }

    #[test]
    fn test_format_duration() {
        use std::time::Duration;

        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs_f64(1.5)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5.00s");
    }
}
