//! Integration tests for kinship-analyze.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use kinship_analyze::{
    Analyzer, FallbackProvider, FeatureExtractor, ProjectDetector, SimilarityEngine,
};
use kinship_core::{
    FeatureVector, FileId, FileRecord, MoveAction, OrganizeConfig, Project, ProjectType,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Write files and build their records in the given order.
fn fixture(root: &Path, files: &[(&str, &str)]) -> Vec<FileRecord> {
    let config = OrganizeConfig::default();
    files
        .iter()
        .enumerate()
        .map(|(i, (rel, contents))| {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, contents).unwrap();
            let meta = fs::metadata(&path).unwrap();
            let ext = path.extension().unwrap().to_string_lossy().to_lowercase();
            FileRecord::new(
                FileId::new(i as u32),
                path,
                meta.len(),
                meta.modified().unwrap(),
                config.detect_kind(&ext),
            )
        })
        .collect()
}

fn analyzer(config: OrganizeConfig) -> Analyzer {
    Analyzer::with_provider(config, FallbackProvider::local_only())
}

fn vectors_for(records: &[FileRecord]) -> Vec<FeatureVector> {
    FeatureExtractor::new(FallbackProvider::local_only())
        .extract_all(records, &CancellationToken::new())
        .unwrap()
        .vectors
}

fn mixed_fixture(root: &Path) -> Vec<FileRecord> {
    fixture(
        root,
        &[
            ("inbox/midnight_song1.mp3", "not really audio"),
            ("inbox/thesis_draft.txt", "thesis chapter methods results discussion"),
            ("inbox/midnight_song2.mp3", "not really audio either"),
            ("downloads/beach_trip.txt", "sunset waves sand"),
            ("inbox/thesis_final.txt", "thesis chapter methods results conclusion"),
            ("inbox/midnight_lyrics.txt", "darkness falls over the quiet town"),
            ("misc/quarterly_taxes.txt", "deductions receipts"),
            ("downloads/beach_sunset.txt", "sunset waves evening"),
        ],
    )
}

#[test]
fn test_midnight_music_project() {
    let temp = TempDir::new().unwrap();
    let records = fixture(
        temp.path(),
        &[
            ("inbox/midnight_song1.mp3", "not really audio"),
            ("inbox/midnight_song2.mp3", "not really audio either"),
            ("inbox/midnight_album_art.jpg", "not really a jpeg"),
            ("inbox/midnight_lyrics.txt", "darkness falls over the quiet town"),
        ],
    );
    let config = OrganizeConfig::default();
    let threshold = config.similarity_threshold;
    let analysis = analyzer(config)
        .analyze(records, &temp.path().join("out"), &CancellationToken::new())
        .unwrap();

    assert_eq!(analysis.projects.len(), 1);
    let project = &analysis.projects[0];
    assert_eq!(project.project_type, ProjectType::Music);
    assert_eq!(project.file_count(), 4);
    assert!(project.confidence > threshold);
    assert_eq!(project.name, "Music_Project_Midnight");
    assert!(project.common.keywords.contains("midnight"));

    // The fake jpeg degrades but is still grouped and reported.
    assert!(analysis.vectors[2].degraded);
    assert_eq!(analysis.report.failures.len(), 1);
}

#[test]
fn test_isolated_file_is_singleton() {
    let temp = TempDir::new().unwrap();
    let records = mixed_fixture(temp.path());
    let analysis = analyzer(OrganizeConfig::default())
        .analyze(records, &temp.path().join("out"), &CancellationToken::new())
        .unwrap();

    let taxes = analysis
        .projects
        .iter()
        .find(|p| p.members.contains(&FileId::new(6)))
        .unwrap();
    assert_eq!(taxes.members, vec![FileId::new(6)]);
    assert_eq!(taxes.project_type, ProjectType::General);
    assert_eq!(taxes.confidence, 0.0);
}

#[test]
fn test_projects_partition_input() {
    let temp = TempDir::new().unwrap();
    let records = mixed_fixture(temp.path());
    let count = records.len();
    let analysis = analyzer(OrganizeConfig::default())
        .analyze(records, &temp.path().join("out"), &CancellationToken::new())
        .unwrap();

    let mut seen = BTreeSet::new();
    for project in &analysis.projects {
        assert!(!project.members.is_empty());
        for id in &project.members {
            assert!(seen.insert(*id), "{id:?} appears twice");
        }
    }
    assert_eq!(seen.len(), count);
    assert_eq!(analysis.plan.entries.len(), count);

    // Components are ordered by lowest member, members by discovery order.
    let firsts: Vec<FileId> = analysis.projects.iter().map(|p| p.members[0]).collect();
    let mut sorted = firsts.clone();
    sorted.sort();
    assert_eq!(firsts, sorted);
    for project in &analysis.projects {
        assert!(project.members.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn test_grouping_is_deterministic() {
    let temp = TempDir::new().unwrap();
    let records = mixed_fixture(temp.path());
    let out = temp.path().join("out");

    let first = analyzer(OrganizeConfig::default())
        .analyze(records.clone(), &out, &CancellationToken::new())
        .unwrap();
    let second = analyzer(OrganizeConfig::default())
        .analyze(records, &out, &CancellationToken::new())
        .unwrap();
    assert_eq!(first.projects, second.projects);
    assert_eq!(first.plan, second.plan);
}

#[test]
fn test_similarity_is_symmetric() {
    let temp = TempDir::new().unwrap();
    let records = mixed_fixture(temp.path());
    let vectors = vectors_for(&records);
    let engine = SimilarityEngine::default();

    for a in &vectors {
        assert_eq!(engine.score(a, a), 1.0);
        for b in &vectors {
            assert_eq!(engine.score(a, b), engine.score(b, a));
            let score = engine.score(a, b);
            assert!((0.0..=1.0).contains(&score));
        }
    }
}

#[test]
fn test_threshold_monotonicity() {
    let temp = TempDir::new().unwrap();
    let records = mixed_fixture(temp.path());
    let vectors = vectors_for(&records);

    let partition = |threshold: f64| -> Vec<Project> {
        ProjectDetector::default()
            .with_threshold(threshold)
            .detect(&records, &vectors)
    };
    let thresholds = [0.0, 0.1, 0.3, 0.5, 0.7, 0.9];
    for pair in thresholds.windows(2) {
        let coarse = partition(pair[0]);
        let fine = partition(pair[1]);
        assert!(fine.len() >= coarse.len());
        for project in &fine {
            let members: BTreeSet<_> = project.members.iter().collect();
            assert!(
                coarse
                    .iter()
                    .any(|c| members.iter().all(|m| c.members.contains(m))),
                "project at {} not contained in a project at {}",
                pair[1],
                pair[0]
            );
        }
    }
}

#[test]
fn test_depth_bound() {
    let temp = TempDir::new().unwrap();
    let files: Vec<(String, String)> = (0..12)
        .map(|i| {
            let status = if i % 2 == 0 { "draft" } else { "final" };
            (
                format!("thesis/thesis_{status}_{i}.txt"),
                "thesis research chapter".to_string(),
            )
        })
        .collect();
    let borrowed: Vec<(&str, &str)> = files
        .iter()
        .map(|(p, c)| (p.as_str(), c.as_str()))
        .collect();

    for max_depth in 1..=3 {
        let records = fixture(temp.path(), &borrowed);
        let config = OrganizeConfig {
            max_depth,
            ..OrganizeConfig::default()
        };
        let analysis = analyzer(config)
            .analyze(records, &temp.path().join("out"), &CancellationToken::new())
            .unwrap();
        for layout in &analysis.plan.layouts {
            assert!(layout.tree.depth() <= max_depth);
        }
        for entry in &analysis.plan.entries {
            let rel = entry
                .destination
                .parent()
                .unwrap()
                .strip_prefix(&analysis.plan.destination_root)
                .unwrap();
            assert!(rel.components().count() <= max_depth);
        }
    }
}

#[test]
fn test_conflicting_names_get_suffixes() {
    let temp = TempDir::new().unwrap();
    let records = fixture(
        temp.path(),
        &[
            ("a/report.txt", "quarterly revenue figures"),
            ("b/report.txt", "quarterly revenue figures"),
        ],
    );
    let analysis = analyzer(OrganizeConfig::default())
        .analyze(records, &temp.path().join("out"), &CancellationToken::new())
        .unwrap();

    assert_eq!(analysis.projects.len(), 1);
    let names: Vec<PathBuf> = analysis
        .plan
        .entries
        .iter()
        .map(|e| PathBuf::from(e.destination.file_name().unwrap()))
        .collect();
    assert_eq!(names, vec![PathBuf::from("report.txt"), PathBuf::from("report_1.txt")]);
    assert_eq!(analysis.plan.entries[0].action, MoveAction::Move);
    assert_eq!(analysis.plan.entries[1].action, MoveAction::ConflictRenamed);
    assert_eq!(analysis.report.conflicts, 1);
}

#[test]
fn test_cancelled_analysis() {
    let temp = TempDir::new().unwrap();
    let records = mixed_fixture(temp.path());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = analyzer(OrganizeConfig::default()).analyze(records, temp.path(), &cancel);
    assert!(result.is_err());
}

#[test]
fn test_analyze_by_kind() {
    let temp = TempDir::new().unwrap();
    let records = mixed_fixture(temp.path());
    let out = temp.path().join("out");
    let analysis = analyzer(OrganizeConfig::default())
        .analyze_by_kind(records, &out)
        .unwrap();

    let folders: Vec<&str> = analysis.plan.layouts.iter().map(|l| l.tree.label.as_str()).collect();
    assert_eq!(folders, vec!["Audio", "Documents"]);
    assert_eq!(analysis.plan.entries.len(), 8);
    for entry in &analysis.plan.entries {
        let rel = entry.destination.strip_prefix(&out).unwrap();
        assert_eq!(rel.components().count(), 2);
    }
    assert_eq!(analysis.report.files, 8);
    assert_eq!(analysis.report.projects[0].files, 2);
}

#[test]
fn test_search_ranks_matching_files() {
    let temp = TempDir::new().unwrap();
    let records = mixed_fixture(temp.path());
    let hits = analyzer(OrganizeConfig::default())
        .search(&records, "sunset waves", 3, &CancellationToken::new())
        .unwrap();

    let names: BTreeSet<String> = hits
        .iter()
        .map(|h| h.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        BTreeSet::from(["beach_sunset.txt".to_string(), "beach_trip.txt".to_string()])
    );
    assert_eq!(hits[0].path.file_name().unwrap(), "beach_sunset.txt");
}
