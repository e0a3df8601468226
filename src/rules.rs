//! Release rules that can be decided from the directory tree alone.
//!
//! Each function evaluates one group of rules and appends the resulting
//! checks to the analysis, in the order they are printed.

use crate::analysis::Analysis;
use crate::check::{CheckEngine, Level, INTERNAL_RULE};
use crate::release::ReleaseDir;

/// Maximum length of any path inside a release, folder name included.
pub const MAX_PATH_LENGTH: usize = 180;

/// Conventional cover file name.
pub const DEFAULT_COVER: &str = "cover.jpg";

const ARROW: &str = "⮕ ";

/// Extensions accepted by the upload form.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    ".ac3", ".accurip", ".azw3", ".chm", ".cue", ".djv", ".djvu", ".doc", ".dmg", ".dts", ".epub",
    ".ffp", ".flac", ".gif", ".htm", ".html", ".jpeg", ".jpg", ".lit", ".log", ".m3u", ".m3u8",
    ".m4a", ".m4b", ".md5", ".mobi", ".mp3", ".mp4", ".nfo", ".pdf", ".pls", ".png", ".rtf",
    ".sfv", ".txt",
];

/// Music formats that must not sit next to the FLAC tracks.
pub const NON_FLAC_MUSIC_EXTENSIONS: &[&str] = &[
    ".ac3", ".dts", ".m4a", ".m4b", ".mp3", ".mp4", ".aac", ".alac", ".ogg", ".opus",
];

/// Accompanying (non-music) file formats.
pub const NON_MUSIC_EXTENSIONS: &[&str] = &[
    ".accurip", ".azw3", ".chm", ".cue", ".djv", ".djvu", ".doc", ".dmg", ".epub", ".ffp", ".gif",
    ".htm", ".html", ".jpeg", ".jpg", ".lit", ".log", ".m3u", ".m3u8", ".md5", ".mobi", ".nfo",
    ".pdf", ".pls", ".png", ".rtf", ".sfv", ".txt",
];

const FORBIDDEN_CHARACTERS: &[&str] = &[":", "*", "\\", "?", "\"", "<", ">", "|", "$", "`"];
const FORBIDDEN_LEADING_CHARACTERS: &[&str] = &[" ", "."];

/// Rule 2.3.1: the folder holds FLAC tracks. Returns `false` when it does
/// not, in which case the remaining rules are meaningless.
pub fn check_presence(engine: &CheckEngine, release: &ReleaseDir, analysis: &mut Analysis) -> bool {
    let has_flacs = !release.flacs().is_empty();
    analysis.append(engine.evaluate(
        "2.3.1",
        Level::Critical,
        has_flacs,
        "Release contains FLAC files.",
        "Release has no FLACs!",
    ));
    let total_mb = megabytes(release.total_size());
    analysis.append(engine.evaluate(
        INTERNAL_RULE,
        Level::Info,
        true,
        &format!("Total size of release folder: {total_mb:.2}Mb."),
        "",
    ));
    has_flacs
}

/// Music file rules that do not need to decode the tracks.
pub fn check_music_files(engine: &CheckEngine, release: &ReleaseDir, analysis: &mut Analysis) {
    let others: Vec<String> = release
        .files_with_extensions(NON_FLAC_MUSIC_EXTENSIONS)
        .iter()
        .map(|f| f.relative.to_string_lossy().into_owned())
        .collect();
    analysis.append(engine.evaluate(
        "2.1.6.3",
        Level::Critical,
        others.is_empty(),
        "Release does not also contain other kinds of music files.",
        &format!(
            "Release also contains other music formats, possible mutt rip: {}",
            others.join(", ")
        ),
    ));
}

/// Organization rules: path length, extensions, empty folders, leading characters.
pub fn check_organization(engine: &CheckEngine, release: &ReleaseDir, analysis: &mut Analysis) {
    let too_long = release.paths_longer_than(MAX_PATH_LENGTH);
    analysis.append(engine.evaluate(
        "2.3.12",
        Level::Critical,
        too_long.is_empty(),
        "Maximum character length is less than 180 characters.",
        "Maximum character length exceeds 180 characters.",
    ));
    for path in &too_long {
        analysis.append(engine.evaluate(
            "2.3.12",
            Level::Critical,
            false,
            "",
            &format!("{ARROW}Too long: {path}"),
        ));
    }

    let forbidden: Vec<String> = release
        .files_without_extensions(ALLOWED_EXTENSIONS)
        .iter()
        .map(|f| f.relative.to_string_lossy().into_owned())
        .collect();
    analysis.append(engine.evaluate(
        "wiki#371",
        Level::Critical,
        forbidden.is_empty(),
        "Release only contains allowed extensions.",
        "Release contains forbidden extensions, which would be rejected by upload.php.",
    ));
    if !forbidden.is_empty() {
        analysis.append(engine.evaluate(
            "wiki#371",
            Level::Critical,
            false,
            "",
            &format!("{ARROW}Forbidden files: {}", forbidden.join(", ")),
        ));
    }

    analysis.append(engine.evaluate(
        "2.3.3",
        Level::Critical,
        release.empty_dirs().is_empty(),
        "Release does not have empty folders.",
        "Release has empty folders.",
    ));

    analysis.append(engine.evaluate(
        "2.3.20",
        Level::Critical,
        release.names_starting_with(FORBIDDEN_LEADING_CHARACTERS).is_empty(),
        "No leading space/dot found in files and folders.",
        "Release has files or folders with a leading space or dot.",
    ));
}

/// File name rules.
pub fn check_filenames(engine: &CheckEngine, release: &ReleaseDir, analysis: &mut Analysis) {
    let with_forbidden = release.names_containing(FORBIDDEN_CHARACTERS);
    analysis.append(engine.evaluate(
        INTERNAL_RULE,
        Level::Critical,
        with_forbidden.is_empty(),
        "Tracks filenames do not appear to contain problematic characters.",
        "At least one track filename or folder contains problematic characters.",
    ));
    if !with_forbidden.is_empty() {
        analysis.append(engine.evaluate(
            INTERNAL_RULE,
            Level::Critical,
            false,
            "",
            &format!("{ARROW}In files and folders: {}", with_forbidden.join(", ")),
        ));
    }

    let capitalized = release
        .flacs()
        .iter()
        .any(|f| f.raw_extension().as_deref() == Some("FLAC"));
    analysis.append(engine.evaluate(
        INTERNAL_RULE,
        Level::Warning,
        !capitalized,
        "Track filenames have lower case extensions.",
        "At least one filename has an uppercase .FLAC extension.",
    ));
}

/// Folder name rules.
pub fn check_folder_name(engine: &CheckEngine, release: &ReleaseDir, analysis: &mut Analysis) {
    let name = release.folder_name();

    analysis.append(engine.evaluate(
        "2.3.2",
        Level::Warning,
        name.contains("FLAC"),
        "Format (FLAC) found in folder name.",
        "Format (FLAC) not found in folder name.",
    ));

    let from_cd = !release.files_with_extensions(&[".log", ".cue"]).is_empty();
    if from_cd {
        analysis.append(engine.evaluate(
            "2.3.2",
            Level::Warning,
            name.contains("CD"),
            "Release contains .log/.cue files and the folder name properly mentions a CD source.",
            "Since release contains .log/.cue, it seems to be sourced from CD. The folder name could mention it.",
        ));
    } else {
        analysis.append(engine.evaluate(
            "2.3.2",
            Level::Warning,
            name.contains("WEB"),
            "Release does not contain .log/.cue files and the folder name properly mentions a WEB source.",
            "Since release does not contain .log/.cue, it is probably sourced from WEB. The folder name could mention it.",
        ));
    }
}

/// Cover and accompanying file rules.
pub fn check_extra_files(engine: &CheckEngine, release: &ReleaseDir, analysis: &mut Analysis) {
    analysis.append(engine.evaluate(
        INTERNAL_RULE,
        Level::Warning,
        release.has_file_in_track_folders(DEFAULT_COVER),
        &format!("Release has a conventional {DEFAULT_COVER} in the top folder or in all disc subfolders."),
        &format!(
            "Cannot find {DEFAULT_COVER} in top folder or in all disc subfolders, consider adding one or renaming the cover to that name."
        ),
    ));

    let extras = release.files_with_extensions(NON_MUSIC_EXTENSIONS);
    analysis.append(engine.evaluate(
        INTERNAL_RULE,
        Level::Warning,
        !extras.is_empty(),
        &format!("Release has {} accompanying files.", extras.len()),
        "Release does not have any kind of accompanying files. Suggestion: consider adding at least a cover.",
    ));

    let extras_size = extras.iter().fold(0u64, |acc, f| acc.saturating_add(f.size));
    analysis.append(engine.evaluate(
        INTERNAL_RULE,
        Level::Info,
        true,
        &format!("Total size of accompanying files: {:.2}Mb.", megabytes(extras_size)),
        "",
    ));

    let ratio = percentage(extras_size, release.total_size());
    let ratio_comment = format!("Accompanying files represent {ratio:.2}% of the total size.");
    analysis.append(engine.evaluate(
        INTERNAL_RULE,
        Level::Warning,
        ratio < 10.0,
        &ratio_comment,
        &format!(
            "{ratio_comment} Suggestion: if this is because of high resolution artwork or notes, consider uploading separately and linking the files in the description."
        ),
    ));
}

/// Run every rule group in display order.
pub fn check_release(engine: &CheckEngine, release: &ReleaseDir, analysis: &mut Analysis) {
    if !check_presence(engine, release, analysis) {
        return;
    }
    check_music_files(engine, release, analysis);
    check_organization(engine, release, analysis);
    check_filenames(engine, release, analysis);
    check_extra_files(engine, release, analysis);
    check_folder_name(engine, release, analysis);
}

#[allow(clippy::cast_precision_loss)]
fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

#[allow(clippy::cast_precision_loss)]
fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    100.0 * part as f64 / total as f64
}
