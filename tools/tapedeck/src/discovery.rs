use crate::config::{AppConfig, DiscoveryConfig};
use crate::errors::TapedeckError;
use crate::runtime::FileSystem;
use std::path::{Path, PathBuf};

/// One unit of recording work, fixed at discovery time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub script_path: PathBuf,
    pub chapter: String,
    pub images_dir: PathBuf,
    /// Artifact name declared by the script's `Output` header, if any.
    /// Absence disables relocation but not the run.
    pub output_name: Option<String>,
}

pub fn discover_scripts(
    fs: &dyn FileSystem,
    root: &Path,
    cfg: &AppConfig,
    selectors: &[String],
) -> Result<Vec<Job>, TapedeckError> {
    let mut jobs = Vec::new();
    for (chapter, images_dir) in chapter_image_dirs(fs, root, &cfg.discovery, selectors)? {
        let Ok(entries) = fs.list_dir(&images_dir) else {
            continue;
        };
        for entry in entries {
            if !file_name_ends_with(&entry, &cfg.recording.script_suffix) {
                continue;
            }
            let output_name = fs
                .read_to_string(&entry)
                .ok()
                .and_then(|contents| parse_output_name(&contents));
            jobs.push(Job {
                script_path: entry,
                chapter: chapter.clone(),
                images_dir: images_dir.clone(),
                output_name,
            });
        }
    }
    Ok(jobs)
}

pub fn discover_artifacts(
    fs: &dyn FileSystem,
    root: &Path,
    cfg: &AppConfig,
) -> Result<Vec<PathBuf>, TapedeckError> {
    let mut artifacts = Vec::new();
    for (_, images_dir) in chapter_image_dirs(fs, root, &cfg.discovery, &[])? {
        let Ok(entries) = fs.list_dir(&images_dir) else {
            continue;
        };
        for entry in entries {
            if file_name_ends_with(&entry, &cfg.verify.artifact_suffix) {
                artifacts.push(entry);
            }
        }
    }
    artifacts.sort();
    Ok(artifacts)
}

/// Chapter directories are immediate children of the root, skipping hidden
/// entries and the reserved tooling names. Selectors filter case-sensitively
/// by prefix or substring of the directory name.
fn chapter_image_dirs(
    fs: &dyn FileSystem,
    root: &Path,
    discovery: &DiscoveryConfig,
    selectors: &[String],
) -> Result<Vec<(String, PathBuf)>, TapedeckError> {
    let mut dirs = Vec::new();
    for entry in fs.list_dir(root)? {
        if !fs.is_dir(&entry) {
            continue;
        }
        let Some(name) = entry.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if name.starts_with('.') || discovery.exclude_dirs.iter().any(|ex| ex == name) {
            continue;
        }
        if !chapter_matches(name, selectors) {
            continue;
        }
        let images_dir = entry.join(&discovery.images_subdir);
        if fs.is_dir(&images_dir) {
            dirs.push((name.to_string(), images_dir));
        }
    }
    dirs.sort();
    Ok(dirs)
}

pub fn chapter_matches(name: &str, selectors: &[String]) -> bool {
    if selectors.is_empty() {
        return true;
    }
    selectors
        .iter()
        .any(|sel| name.starts_with(sel.as_str()) || name.contains(sel.as_str()))
}

/// First line of the form `Output <token>` declares the produced artifact
/// name. The keyword is case-sensitive and the value is a single
/// non-whitespace token.
pub fn parse_output_name(contents: &str) -> Option<String> {
    for line in contents.lines() {
        let Some(rest) = line.strip_prefix("Output") else {
            continue;
        };
        if !rest.starts_with(char::is_whitespace) {
            continue;
        }
        if let Some(token) = rest.split_whitespace().next() {
            return Some(token.to_string());
        }
    }
    None
}

fn file_name_ends_with(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(suffix))
}

#[cfg(test)]
mod tests {
    use super::{chapter_matches, discover_artifacts, discover_scripts, parse_output_name};
    use crate::config::AppConfig;
    use crate::runtime::FakeFileSystem;
    use std::path::{Path, PathBuf};

    fn seeded_fs() -> FakeFileSystem {
        let fs = FakeFileSystem::default();
        fs.insert_file("/course/01-intro/images/first-demo.tape", "Output first-demo.gif\n");
        fs.insert_file("/course/01-intro/images/first-demo.gif", "gif");
        fs.insert_file("/course/03-tools/images/tools-demo.tape", "Set FontSize 14\n");
        fs.insert_file("/course/03-tools/images/tools-demo.gif", "gif");
        fs.insert_file("/course/.hidden/images/sneaky-demo.tape", "Output x.gif\n");
        fs.insert_file("/course/node_modules/images/dep-demo.tape", "Output y.gif\n");
        fs.insert_file("/course/09-notes/README.md", "no images dir here");
        fs
    }

    #[test]
    fn skips_hidden_and_reserved_directories() {
        let fs = seeded_fs();
        let jobs = discover_scripts(&fs, Path::new("/course"), &AppConfig::default(), &[])
            .expect("discover");
        let chapters = jobs.iter().map(|job| job.chapter.as_str()).collect::<Vec<_>>();
        assert_eq!(chapters, vec!["01-intro", "03-tools"]);
    }

    #[test]
    fn chapter_selectors_filter_by_prefix_or_substring() {
        let fs = seeded_fs();
        let cfg = AppConfig::default();
        let jobs =
            discover_scripts(&fs, Path::new("/course"), &cfg, &["03".to_string()]).expect("discover");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].chapter, "03-tools");

        let jobs = discover_scripts(&fs, Path::new("/course"), &cfg, &["tools".to_string()])
            .expect("discover");
        assert_eq!(jobs.len(), 1);

        assert!(!chapter_matches("03-tools", &["03-TOOLS".to_string()]));
    }

    #[test]
    fn output_header_is_carried_on_the_job() {
        let fs = seeded_fs();
        let jobs = discover_scripts(&fs, Path::new("/course"), &AppConfig::default(), &[])
            .expect("discover");
        assert_eq!(jobs[0].output_name.as_deref(), Some("first-demo.gif"));
        assert_eq!(jobs[1].output_name, None);
        assert_eq!(jobs[0].images_dir, PathBuf::from("/course/01-intro/images"));
    }

    #[test]
    fn artifacts_match_only_the_configured_suffix() {
        let fs = seeded_fs();
        fs.insert_file("/course/01-intro/images/screenshot.png", "png");
        let artifacts = discover_artifacts(&fs, Path::new("/course"), &AppConfig::default())
            .expect("discover");
        assert_eq!(
            artifacts,
            vec![
                PathBuf::from("/course/01-intro/images/first-demo.gif"),
                PathBuf::from("/course/03-tools/images/tools-demo.gif"),
            ]
        );
    }

    #[test]
    fn output_header_parsing_is_line_anchored() {
        assert_eq!(
            parse_output_name("Set Width 800\nOutput demo.gif\n"),
            Some("demo.gif".to_string())
        );
        assert_eq!(parse_output_name("Output   demo.gif extra\n"), Some("demo.gif".to_string()));
        assert_eq!(parse_output_name("# Output demo.gif\n"), None);
        assert_eq!(parse_output_name("Outputdemo.gif\n"), None);
        assert_eq!(parse_output_name("output demo.gif\n"), None);
        assert_eq!(parse_output_name("Output\n"), None);
    }
}
