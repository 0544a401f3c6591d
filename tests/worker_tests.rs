use async_trait::async_trait;
use setlist_playlist_sync::api::mock::MockCatalog;
use setlist_playlist_sync::error::{SourceError, SyncError};
use setlist_playlist_sync::matching::{build_query, MatchConfig};
use setlist_playlist_sync::models::{Setlist, SongRequest, TrackCandidate};
use setlist_playlist_sync::reconcile::NoProgress;
use setlist_playlist_sync::setlist::SetlistSource;
use setlist_playlist_sync::worker::{read_setlist_refs, run_batch, run_sync, PlaylistTarget, SyncRequest};
use std::collections::HashMap;
use std::io::Write;

/// Setlists served from memory by reference.
struct StaticSource {
    setlists: HashMap<String, Setlist>,
}

impl StaticSource {
    fn new(entries: Vec<(&str, &str, Vec<&str>)>) -> Self {
        let setlists = entries
            .into_iter()
            .map(|(reference, artist, titles)| {
                (
                    reference.to_string(),
                    Setlist {
                        id: reference.to_string(),
                        artist: artist.to_string(),
                        songs: SongRequest::from_titles(titles),
                        event_date: None,
                        venue: None,
                    },
                )
            })
            .collect();
        Self { setlists }
    }
}

#[async_trait]
impl SetlistSource for StaticSource {
    async fn fetch_setlist(&self, reference: &str) -> Result<Setlist, SourceError> {
        self.setlists
            .get(reference)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(reference.to_string()))
    }
}

fn cand(uri: &str, artist: &str) -> TrackCandidate {
    TrackCandidate {
        id: uri.to_string(),
        title: uri.to_string(),
        artist_names: vec![artist.to_string()],
        uri: uri.to_string(),
    }
}

fn catalog() -> MockCatalog {
    MockCatalog::new()
        .with_playlist("existing1", vec![])
        .with_search(&build_query("Band X", "Song A"), vec![cand("u1", "Band X")])
        .with_search(&build_query("Band X", "Song B"), vec![cand("u2", "Band X")])
        .with_search(&build_query("Band Y", "Other"), vec![cand("u3", "Band Y")])
}

fn source() -> StaticSource {
    StaticSource::new(vec![
        ("aaaa1111", "Band X", vec!["Song A", "Song B"]),
        ("bbbb2222", "Band Y", vec!["Other", "Song A"]),
        ("eeee0000", "Band Z", vec![]),
    ])
}

#[tokio::test]
async fn sync_into_existing_playlist_by_url() {
    let catalog = catalog();
    let request = SyncRequest {
        setlist: "aaaa1111".into(),
        target: PlaylistTarget::Existing {
            reference: "https://open.spotify.com/playlist/existing1?si=abc".into(),
        },
    };

    let report = run_sync(&catalog, &source(), &MatchConfig::default(), &request, &NoProgress)
        .await
        .unwrap();
    assert_eq!(report.playlist_id, "existing1");
    assert_eq!(report.artist, "Band X");
    assert_eq!(report.outcome.added_count, 2);
    assert_eq!(
        catalog.playlist("existing1").unwrap(),
        vec!["u1".to_string(), "u2".to_string()]
    );
}

#[tokio::test]
async fn new_playlist_defaults_to_artist_setlist_name() {
    let catalog = catalog();
    let request = SyncRequest {
        setlist: "aaaa1111".into(),
        target: PlaylistTarget::New {
            name: None,
            description: None,
        },
    };

    let report = run_sync(&catalog, &source(), &MatchConfig::default(), &request, &NoProgress)
        .await
        .unwrap();
    assert_eq!(report.playlist_id, "mockplaylist1");
    assert_eq!(catalog.playlist("mockplaylist1").unwrap().len(), 2);
}

#[tokio::test]
async fn setlist_without_songs_is_rejected_before_touching_the_catalog() {
    let catalog = catalog();
    let request = SyncRequest {
        setlist: "eeee0000".into(),
        target: PlaylistTarget::New {
            name: Some("Never created".into()),
            description: None,
        },
    };

    let err = run_sync(&catalog, &source(), &MatchConfig::default(), &request, &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Source(SourceError::NoSongs(_))));
    assert!(catalog.playlist("mockplaylist1").is_none());
}

#[tokio::test]
async fn unparseable_playlist_reference_is_invalid_target() {
    let catalog = catalog();
    let request = SyncRequest {
        setlist: "aaaa1111".into(),
        target: PlaylistTarget::Existing {
            reference: "https://example.com/not a playlist".into(),
        },
    };

    let err = run_sync(&catalog, &source(), &MatchConfig::default(), &request, &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidTarget(_)));
    assert!(catalog.searched_queries().is_empty());
}

#[tokio::test]
async fn unknown_setlist_surfaces_source_error() {
    let err = run_sync(
        &catalog(),
        &source(),
        &MatchConfig::default(),
        &SyncRequest {
            setlist: "ffff9999".into(),
            target: PlaylistTarget::Existing {
                reference: "existing1".into(),
            },
        },
        &NoProgress,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SyncError::Source(SourceError::NotFound(_))));
}

#[tokio::test]
async fn failed_append_fails_the_sync() {
    let catalog = catalog().failing_append();
    let request = SyncRequest {
        setlist: "aaaa1111".into(),
        target: PlaylistTarget::Existing {
            reference: "existing1".into(),
        },
    };

    let err = run_sync(&catalog, &source(), &MatchConfig::default(), &request, &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::CatalogUnavailable(ref m) if m.contains("adding tracks failed")));
}

#[tokio::test]
async fn batch_skips_bad_setlists_and_dedups_across_setlists() {
    let catalog = catalog();
    let refs: Vec<String> = ["aaaa1111", "ffff9999", "bbbb2222", "eeee0000"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let summary = run_batch(
        &catalog,
        &source(),
        &MatchConfig::default(),
        &refs,
        "existing1",
        &NoProgress,
    )
    .await;

    assert_eq!(summary.reports.len(), 2);
    assert_eq!(summary.skipped.len(), 2);
    assert_eq!(summary.skipped[0].0, "ffff9999");
    assert_eq!(summary.skipped[1].0, "eeee0000");
    // "Song A" by Band Y does not match u1 by Band X; only u3 is new
    assert_eq!(summary.total_added, 3);
    assert_eq!(catalog.append_calls().len(), 2);
}

#[test]
fn setlist_file_skips_blank_and_comment_lines() {
    let mut file = tempfile::NamedTempFile::new().expect("tmp");
    writeln!(file, "# shows to import").unwrap();
    writeln!(file, "https://www.setlist.fm/setlist/a/2020/x-aaaa1111.html").unwrap();
    writeln!(file).unwrap();
    writeln!(file, "   bbbb2222  ").unwrap();

    let refs = read_setlist_refs(file.path()).unwrap();
    assert_eq!(
        refs,
        vec![
            "https://www.setlist.fm/setlist/a/2020/x-aaaa1111.html".to_string(),
            "bbbb2222".to_string()
        ]
    );
}
