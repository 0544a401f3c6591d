use setlist_playlist_sync::api::mock::MockCatalog;
use setlist_playlist_sync::matching::{self, build_query, decide, match_song, MatchConfig};
use setlist_playlist_sync::models::{ExistingTrackSet, MatchOutcome, SongRequest, TrackCandidate};

fn cand(uri: &str, artists: &[&str]) -> TrackCandidate {
    TrackCandidate {
        id: uri.trim_start_matches("spotify:track:").to_string(),
        title: format!("title of {}", uri),
        artist_names: artists.iter().map(|s| s.to_string()).collect(),
        uri: uri.to_string(),
    }
}

#[test]
fn threshold_is_strictly_greater_than() {
    let cfg = MatchConfig::default();
    assert!(!cfg.accepts(0.80));
    assert!(cfg.accepts(0.8000001));
    assert!(cfg.accepts(1.0));
}

#[test]
fn candidate_scoring_exactly_threshold_is_rejected() {
    // one substitution in five characters: similarity exactly 0.8
    assert_eq!(matching::artist_similarity("abcde", "abcdx"), 0.8);
    let song = SongRequest::new("Song", 1);
    let mut existing = ExistingTrackSet::new();
    let cands = vec![cand("spotify:track:1", &["abcdx"])];

    let strict = MatchConfig::default();
    let r = decide(&strict, &song, "abcde", &cands, &mut existing);
    assert_eq!(r.outcome, MatchOutcome::NotFound);

    let looser = MatchConfig {
        similarity_threshold: 0.7999999,
        ..MatchConfig::default()
    };
    let r = decide(&looser, &song, "abcde", &cands, &mut existing);
    assert!(r.is_matched());
}

#[test]
fn first_accepted_candidate_wins_in_catalog_order() {
    let cfg = MatchConfig::default();
    let song = SongRequest::new("Song A", 1);
    let a = cand("spotify:track:a", &["Band X"]);
    let b = cand("spotify:track:b", &["band x"]);
    let other = cand("spotify:track:o", &["Someone Else"]);

    let orders = vec![
        (vec![other.clone(), a.clone(), b.clone()], "spotify:track:a"),
        (vec![b.clone(), other.clone(), a.clone()], "spotify:track:b"),
        (vec![a.clone(), b.clone(), other.clone()], "spotify:track:a"),
    ];
    for (cands, expected) in orders {
        let mut existing = ExistingTrackSet::new();
        let r = decide(&cfg, &song, "Band X", &cands, &mut existing);
        assert_eq!(r.uri(), Some(expected));
        assert!(existing.contains(expected));
    }
}

#[test]
fn any_listed_artist_can_qualify() {
    let cfg = MatchConfig::default();
    let song = SongRequest::new("Collab", 1);
    let mut existing = ExistingTrackSet::new();
    let cands = vec![cand("spotify:track:c", &["Guest Star", "Band X"])];
    assert!(decide(&cfg, &song, "BAND X", &cands, &mut existing).is_matched());
}

#[test]
fn candidate_without_artists_never_matches() {
    let cfg = MatchConfig::default();
    let song = SongRequest::new("Song", 1);
    let mut existing = ExistingTrackSet::new();
    let r = decide(&cfg, &song, "Band X", &[cand("spotify:track:x", &[])], &mut existing);
    assert_eq!(r.outcome, MatchOutcome::NotFound);
    assert!(existing.is_empty());
}

#[test]
fn empty_candidate_list_is_not_found() {
    let cfg = MatchConfig::default();
    let mut existing = ExistingTrackSet::new();
    let r = decide(&cfg, &SongRequest::new("Song", 1), "Band X", &[], &mut existing);
    assert_eq!(r.outcome, MatchOutcome::NotFound);
}

#[test]
fn accepted_track_already_present_is_duplicate_and_scan_stops() {
    let cfg = MatchConfig::default();
    let song = SongRequest::new("Song", 1);
    let mut existing: ExistingTrackSet = ["spotify:track:1"].into_iter().collect();
    // the second candidate would also qualify, but scanning stops at the first
    let cands = vec![cand("spotify:track:1", &["Band X"]), cand("spotify:track:2", &["Band X"])];
    let r = decide(&cfg, &song, "Band X", &cands, &mut existing);
    assert!(matches!(r.outcome, MatchOutcome::Duplicate(ref t) if t.uri == "spotify:track:1"));
    assert!(!existing.contains("spotify:track:2"));
}

#[tokio::test]
async fn match_song_queries_catalog_with_artist_and_title() {
    let catalog = MockCatalog::new().with_search(
        &build_query("Band X", "Song A"),
        vec![cand("spotify:track:u1", &["Band X"])],
    );
    let cfg = MatchConfig::default();
    let mut existing = ExistingTrackSet::new();
    let r = match_song(&catalog, &cfg, &SongRequest::new("Song A", 1), "Band X", &mut existing).await;
    assert_eq!(r.uri(), Some("spotify:track:u1"));
    assert_eq!(catalog.searched_queries(), vec!["Band X Song A".to_string()]);
}

#[tokio::test]
async fn match_song_respects_candidate_limit() {
    let mut cands: Vec<TrackCandidate> = (0..5)
        .map(|i| cand(&format!("spotify:track:n{}", i), &["Nobody"]))
        .collect();
    cands.push(cand("spotify:track:late", &["Band X"]));
    let catalog = MockCatalog::new().with_search(&build_query("Band X", "Song"), cands);
    let cfg = MatchConfig {
        candidate_limit: 5,
        ..MatchConfig::default()
    };
    let mut existing = ExistingTrackSet::new();
    let r = match_song(&catalog, &cfg, &SongRequest::new("Song", 1), "Band X", &mut existing).await;
    assert_eq!(r.outcome, MatchOutcome::NotFound);
}

#[tokio::test]
async fn failed_search_degrades_to_not_found() {
    let catalog = MockCatalog::new().with_failing_search(&build_query("Band X", "Song"));
    let cfg = MatchConfig::default();
    let mut existing = ExistingTrackSet::new();
    let r = match_song(&catalog, &cfg, &SongRequest::new("Song", 1), "Band X", &mut existing).await;
    assert_eq!(r.outcome, MatchOutcome::NotFound);
}
