//! Playlist store: ordered playable items plus loop/cursor bookkeeping
//!
//! The playlist is replaced atomically on every successful load and never
//! mutated in place. A failed load leaves the previous playlist and cursor
//! untouched.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Deserializer};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// One entry of the playlist document
///
/// `timeout` is the maximum segment duration in seconds. The document may
/// carry it as a JSON number or a numeric string; absent or non-positive
/// values mean "play until the source naturally ends" and are normalized to
/// `None` at parse time.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistItem {
    pub uri: String,

    #[serde(default, deserialize_with = "deserialize_timeout")]
    pub timeout: Option<f64>,
}

fn deserialize_timeout<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    let secs = match Option::<Raw>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(Raw::Number(n)) => n,
        Some(Raw::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid timeout value {s:?}")))?,
    };

    if secs > 0.0 && secs.is_finite() {
        Ok(Some(secs))
    } else {
        Ok(None)
    }
}

/// Playlist store with cursor and loop bookkeeping
///
/// The cursor invariant `index < len` holds whenever a playlist is loaded.
/// `loops_completed` increments only when the cursor wraps from the last
/// item to the first.
#[derive(Debug)]
pub struct PlaylistStore {
    items: Vec<PlaylistItem>,
    index: usize,
    loops_completed: i32,
    playthroughs: i32,
    /// Latched when a bounded playlist reaches its playthrough limit;
    /// cleared by the next load or by a limit raise
    exhausted: bool,
    /// Relative item sources resolve against this directory; established by
    /// the most recent file-reference load.
    resolve_dir: PathBuf,
}

impl PlaylistStore {
    /// Create an empty store; `playthroughs < 0` means loop forever
    pub fn new(playthroughs: i32) -> Self {
        Self {
            items: Vec::new(),
            index: 0,
            loops_completed: 0,
            playthroughs,
            exhausted: false,
            resolve_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Load a playlist from inline JSON or an `@path` file reference
    ///
    /// On success the cursor resets to index 0 with zero completed loops.
    /// On any failure the previous playlist and cursor remain in effect.
    pub fn load(&mut self, source: &str) -> Result<()> {
        let (text, dir) = if let Some(path) = source.strip_prefix('@') {
            let path = fs::canonicalize(path)
                .map_err(|e| Error::Config(format!("playlist file {path:?}: {e}")))?;
            let text = fs::read_to_string(&path)
                .map_err(|e| Error::Config(format!("playlist file {path:?}: {e}")))?;
            let dir = path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("/"));
            (text, Some(dir))
        } else {
            (source.to_string(), None)
        };

        let items: Vec<PlaylistItem> = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("playlist is not valid: {e}")))?;

        if items.is_empty() {
            return Err(Error::Config("playlist is empty".to_string()));
        }

        if let Some(dir) = dir {
            debug!("playlist resolution directory is now {}", dir.display());
            self.resolve_dir = dir;
        }

        info!("loaded playlist with {} items", items.len());
        self.items = items;
        self.index = 0;
        self.loops_completed = 0;
        self.exhausted = false;
        Ok(())
    }

    /// Item under the cursor, or None when nothing is loaded
    pub fn current(&self) -> Option<&PlaylistItem> {
        self.items.get(self.index)
    }

    /// Advance the cursor and return the next item, or None on exhaustion
    ///
    /// The cursor wraps from the last item to the first, counting one
    /// completed loop. A bounded playlist whose loop count reaches the
    /// playthrough limit is exhausted and stays exhausted; the cursor rests
    /// at the wrapped position so an explicit restart resumes at item 0.
    pub fn advance(&mut self) -> Option<&PlaylistItem> {
        if self.items.is_empty() {
            debug!("advance with no playlist loaded");
            return None;
        }
        if self.exhausted {
            debug!("advance on exhausted playlist");
            return None;
        }

        self.index += 1;
        if self.index >= self.items.len() {
            self.index = 0;
            self.loops_completed += 1;
            if self.playthroughs >= 0 && self.loops_completed >= self.playthroughs {
                debug!("playlist exhausted after {} loops", self.loops_completed);
                self.exhausted = true;
                return None;
            }
            info!("starting playthrough #{}", self.loops_completed + 1);
        }
        self.current()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 0-based cursor position
    pub fn index(&self) -> usize {
        self.index
    }

    /// Source string of the item under the cursor, as listed in the playlist
    pub fn current_uri(&self) -> Option<&str> {
        self.current().map(|item| item.uri.as_str())
    }

    /// Change the playthrough limit; raising it past the completed loop
    /// count (or making it unbounded) revives an exhausted playlist
    pub fn set_playthroughs(&mut self, playthroughs: i32) {
        self.playthroughs = playthroughs;
        if playthroughs < 0 || self.loops_completed < playthroughs {
            self.exhausted = false;
        }
    }

    /// Resolve an item source into an absolute URI
    ///
    /// Bare paths resolve against the directory established at load time.
    /// Called lazily at start-of-segment, never cached in the item, because
    /// the resolution directory can differ per load.
    pub fn resolve_uri(&self, uri: &str) -> String {
        if uri.contains("://") {
            return uri.to_string();
        }
        let path = Path::new(uri);
        let absolute = if path.is_absolute() {
            normalize_path(path)
        } else {
            normalize_path(&self.resolve_dir.join(path))
        };
        format!("file://{}", absolute.display())
    }
}

/// Lexically normalize a path, folding `.` and `..` components
fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn store_with(items: &str, playthroughs: i32) -> PlaylistStore {
        let mut store = PlaylistStore::new(playthroughs);
        store.load(items).unwrap();
        store
    }

    #[test]
    fn test_load_inline() {
        let store = store_with(r#"[{"uri":"a.mp4","timeout":"5"},{"uri":"b.mp4"}]"#, 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.index(), 0);
        assert_eq!(store.current().unwrap().uri, "a.mp4");
        assert_eq!(store.current().unwrap().timeout, Some(5.0));
        assert_eq!(store.items[1].timeout, None);
    }

    #[test]
    fn test_timeout_forms() {
        let store = store_with(
            r#"[{"uri":"a","timeout":2.5},{"uri":"b","timeout":"-1"},{"uri":"c","timeout":0}]"#,
            1,
        );
        assert_eq!(store.items[0].timeout, Some(2.5));
        assert_eq!(store.items[1].timeout, None);
        assert_eq!(store.items[2].timeout, None);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let mut store = PlaylistStore::new(1);
        assert!(matches!(store.load("not json"), Err(Error::Config(_))));
        assert!(matches!(store.load("[]"), Err(Error::Config(_))));
        assert!(matches!(
            store.load(r#"[{"uri":"a","timeout":"soon"}]"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(store.load("@/no/such/file.json"), Err(Error::Config(_))));
    }

    #[test]
    fn test_failed_load_keeps_previous() {
        let mut store = store_with(r#"[{"uri":"a.mp4"},{"uri":"b.mp4"}]"#, 1);
        store.advance();
        assert_eq!(store.index(), 1);

        assert!(store.load("{broken").is_err());
        assert_eq!(store.len(), 2);
        assert_eq!(store.index(), 1);
        assert_eq!(store.current().unwrap().uri, "b.mp4");
    }

    #[test]
    fn test_load_from_file_sets_resolution_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"[{{"uri":"media/a.mp4"}}]"#).unwrap();

        let mut store = PlaylistStore::new(1);
        store.load(&format!("@{}", path.display())).unwrap();

        let resolved = store.resolve_uri("media/a.mp4");
        let canonical_dir = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(
            resolved,
            format!("file://{}/media/a.mp4", canonical_dir.display())
        );
    }

    #[test]
    fn test_resolve_keeps_absolute_uris() {
        let store = store_with(r#"[{"uri":"a"}]"#, 1);
        assert_eq!(
            store.resolve_uri("rtsp://cam.local/stream"),
            "rtsp://cam.local/stream"
        );
        assert_eq!(store.resolve_uri("/media/a.mp4"), "file:///media/a.mp4");
        assert_eq!(
            store.resolve_uri("/media/../a.mp4"),
            "file:///a.mp4"
        );
    }

    #[test]
    fn test_advance_visits_each_index_per_playthrough() {
        // Bounded playlists visit every index playthroughs times, stepping
        // by 1 modulo the list length.
        for playthroughs in 1..4 {
            let mut store = store_with(r#"[{"uri":"a"},{"uri":"b"},{"uri":"c"}]"#, playthroughs);
            let mut visits = vec![0u32; 3];
            visits[store.index()] += 1;

            let mut prev = store.index();
            while store.advance().is_some() {
                assert_eq!(store.index(), (prev + 1) % 3);
                prev = store.index();
                visits[store.index()] += 1;
            }

            for count in visits {
                assert_eq!(count, playthroughs as u32);
            }
        }
    }

    #[test]
    fn test_exhausted_playlist_rests_at_zero() {
        let mut store = store_with(r#"[{"uri":"a"},{"uri":"b"}]"#, 1);
        assert!(store.advance().is_some());
        assert!(store.advance().is_none());
        assert_eq!(store.index(), 0);
        // Latched; further advances stay exhausted
        assert!(store.advance().is_none());
    }

    #[test]
    fn test_raising_limit_revives_exhausted_playlist() {
        let mut store = store_with(r#"[{"uri":"a"},{"uri":"b"}]"#, 1);
        assert!(store.advance().is_some());
        assert!(store.advance().is_none());
        assert!(store.advance().is_none());

        store.set_playthroughs(2);
        assert!(store.advance().is_some());
        assert_eq!(store.index(), 1);
    }

    #[test]
    fn test_unbounded_never_exhausts() {
        let mut store = store_with(r#"[{"uri":"a"},{"uri":"b"}]"#, -1);
        for _ in 0..50 {
            assert!(store.advance().is_some());
        }
    }

    #[test]
    fn test_zero_playthroughs_plays_single_pass() {
        // With a limit of 0 the first wrap already exhausts the playlist
        let mut store = store_with(r#"[{"uri":"a"},{"uri":"b"}]"#, 0);
        assert!(store.advance().is_some());
        assert!(store.advance().is_none());
    }

    #[test]
    fn test_reload_resets_cursor() {
        let mut store = store_with(r#"[{"uri":"a"},{"uri":"b"}]"#, 1);
        store.advance();
        assert_eq!(store.index(), 1);

        store.load(r#"[{"uri":"x"}]"#).unwrap();
        assert_eq!(store.index(), 0);
        assert_eq!(store.current_uri(), Some("x"));
    }
}
