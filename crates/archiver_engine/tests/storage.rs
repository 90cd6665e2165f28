mod common;

use std::fs;
use std::io::Write;

use archiver_engine::{
    artifact_stem, ensure_output_dir, sanitize_filename, AtomicFileWriter, EpubTracker,
    PersistError,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use common::summary;

#[test]
fn file_names_are_portable() {
    assert_eq!(sanitize_filename("Notes: on/off?"), "Notes on_off");
    assert_eq!(sanitize_filename("  ..hidden.. "), "hidden");
    assert_eq!(sanitize_filename("***"), "unnamed");
    assert_eq!(sanitize_filename("con"), "con_");
    assert_eq!(artifact_stem("The Weekly Letter"), "The_Weekly_Letter");

    let long = format!("{}.epub", "x".repeat(400));
    let capped = sanitize_filename(&long);
    assert_eq!(capped.len(), 255);
    assert!(capped.ends_with(".epub"));

    let wide = "é".repeat(200);
    let capped = sanitize_filename(&wide);
    assert!(capped.len() <= 255);
    assert!(capped.chars().all(|c| c == 'é'));
}

#[test]
fn atomic_writes_replace_whole_files() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("nested").join("artifact.txt");
    let writer = AtomicFileWriter;

    writer.write_bytes(&target, b"first version").unwrap();
    writer.write_bytes(&target, b"second").unwrap();
    assert_eq!(fs::read_to_string(&target).unwrap(), "second");

    let failed = writer.write_with(&target, |out| {
        out.write_all(b"partial")?;
        Err(std::io::Error::other("disk full"))
    });
    assert!(matches!(failed, Err(PersistError::Io(_))));
    assert_eq!(fs::read_to_string(&target).unwrap(), "second");

    let leftovers = fs::read_dir(target.parent().unwrap()).unwrap().count();
    assert_eq!(leftovers, 1);
}

#[test]
fn output_dir_must_be_a_directory() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("taken");
    fs::write(&file, b"").unwrap();
    assert!(matches!(
        ensure_output_dir(&file),
        Err(PersistError::OutputDir(_))
    ));
    ensure_output_dir(&temp.path().join("a").join("b")).unwrap();
    assert!(temp.path().join("a").join("b").is_dir());
}

#[test]
fn tracker_remembers_included_links() {
    let temp = TempDir::new().unwrap();
    let epub = temp.path().join("Letters.epub");
    assert_eq!(
        EpubTracker::tracker_path_for(&epub),
        temp.path().join("Letters_tracker.json")
    );

    let mut tracker = EpubTracker::load(&epub);
    assert!(tracker.record().post_links.is_empty());
    tracker.set_metadata("Letters", "Ada", "https://letters.substack.com");
    tracker.track(["https://letters.substack.com/p/a", "https://letters.substack.com/p/b"]);
    tracker.track(["https://letters.substack.com/p/a/"]);
    tracker.save().unwrap();
    assert!(!EpubTracker::exists(&epub), "the e-book itself is still missing");

    fs::write(&epub, b"placeholder").unwrap();
    assert!(EpubTracker::exists(&epub));

    let reloaded = EpubTracker::load(&epub);
    assert_eq!(reloaded.record().post_links.len(), 2);
    assert_eq!(reloaded.record().author, "Ada");
    assert!(reloaded.record().last_updated.is_some());

    let base = "https://letters.substack.com";
    let listing = vec![summary(base, "a", 1), summary(base, "b", 2), summary(base, "c", 3)];
    let fresh = reloaded.new_posts(&listing);
    assert_eq!(fresh, vec![summary(base, "c", 3)]);

    let raw = fs::read_to_string(reloaded.tracker_path()).unwrap();
    assert!(raw.contains("\"url\": \"https://letters.substack.com\""), "{raw}");
}

#[test]
fn corrupt_trackers_start_empty() {
    let temp = TempDir::new().unwrap();
    let epub = temp.path().join("x.epub");
    fs::write(EpubTracker::tracker_path_for(&epub), b"[not a tracker").unwrap();
    assert!(EpubTracker::load(&epub).record().post_links.is_empty());
}
