use kinship_scan::{ExtensionSets, FileKind, JwalkScanner, ScanConfig};
use std::fs;
use tempfile::TempDir;

fn populate(root: &std::path::Path) {
    fs::create_dir_all(root.join("papers/drafts")).unwrap();
    fs::write(root.join("papers/thesis_final.pdf"), "%PDF-1.4").unwrap();
    fs::write(root.join("papers/drafts/thesis_draft.docx"), "PK").unwrap();
    fs::write(root.join("papers/figure1.png"), "png").unwrap();
    fs::write(root.join("budget.xlsx"), "PK").unwrap();
}

#[test]
fn test_scan_is_deterministic() {
    let temp = TempDir::new().unwrap();
    populate(temp.path());
    let config = ScanConfig::new(temp.path());
    let scanner = JwalkScanner::new();

    let first = scanner.scan(&config, &ExtensionSets::default()).unwrap();
    let second = scanner.scan(&config, &ExtensionSets::default()).unwrap();

    let paths = |d: &kinship_scan::Discovery| {
        d.records.iter().map(|r| r.path.clone()).collect::<Vec<_>>()
    };
    assert_eq!(paths(&first), paths(&second));
    assert_eq!(first.records.len(), 4);
}

#[test]
fn test_multiple_roots_and_file_roots() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    populate(a.path());
    fs::write(b.path().join("song.mp3"), "ID3").unwrap();
    fs::write(b.path().join("cover.jpg"), "jpg").unwrap();

    let config = ScanConfig::builder()
        .roots(vec![a.path().to_path_buf(), b.path().join("song.mp3")])
        .build()
        .unwrap();
    let discovery = JwalkScanner::new()
        .scan(&config, &ExtensionSets::default())
        .unwrap();

    assert_eq!(discovery.roots.len(), 2);
    assert_eq!(discovery.records.len(), 5);
    let last = discovery.records.last().unwrap();
    assert_eq!(last.name.as_str(), "song.mp3");
    assert_eq!(last.kind, FileKind::Audio);
    assert!(
        !discovery
            .records
            .iter()
            .any(|r| r.name.as_str() == "cover.jpg")
    );
}

#[test]
fn test_overlapping_roots_are_deduplicated() {
    let temp = TempDir::new().unwrap();
    populate(temp.path());

    let config = ScanConfig::builder()
        .roots(vec![temp.path().to_path_buf(), temp.path().join("papers")])
        .build()
        .unwrap();
    let discovery = JwalkScanner::new()
        .scan(&config, &ExtensionSets::default())
        .unwrap();

    assert_eq!(discovery.records.len(), 4);
    for (i, record) in discovery.records.iter().enumerate() {
        assert_eq!(record.id.index(), i);
    }
}

#[test]
fn test_hidden_files_when_included() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join(".notes.md"), "# hidden").unwrap();
    fs::write(temp.path().join("visible.md"), "# visible").unwrap();

    let mut config = ScanConfig::new(temp.path());
    let discovery = JwalkScanner::new()
        .scan(&config, &ExtensionSets::default())
        .unwrap();
    assert_eq!(discovery.records.len(), 1);

    config.include_hidden = true;
    let discovery = JwalkScanner::new()
        .scan(&config, &ExtensionSets::default())
        .unwrap();
    assert_eq!(discovery.records.len(), 2);
}
