// Local storage of in-progress submissions, one file per form request.

use std::path::Path;

use crate::calc::*;

pub fn draft_path(root: &Path, settings: &DraftSettings) -> String {
    let dir = resolve_path(root, &settings.directory);
    resolve_path(Path::new(&dir), &format!("{}.json", settings.request_id))
}

/// Loads a saved draft. A missing or unreadable draft yields an empty document.
pub fn load_draft(path: &str, fallback: &Metadata) -> ResponseDocument {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            info!("load_draft: no draft at {:?} ({}), starting a new one", path, e);
            return ResponseDocument::new(fallback.clone());
        }
    };
    match serde_json::from_str::<ResponseDocument>(&contents) {
        Ok(doc) => {
            debug!("load_draft: loaded {:?}", path);
            doc
        }
        Err(e) => {
            warn!("load_draft: ignoring unreadable draft {:?}: {}", path, e);
            ResponseDocument::new(fallback.clone())
        }
    }
}

pub fn save_draft(path: &str, js: &JSValue) -> BCalcResult<()> {
    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent).context(WritingFileSnafu { path })?;
    }
    let pretty = serde_json::to_string_pretty(js).context(SerializingJsonSnafu {})?;
    fs::write(path, pretty).context(WritingFileSnafu { path })?;
    info!("Saved draft {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_and_broken_drafts() {
        let fallback = Metadata {
            student_id: "stu-1".to_string(),
            rater_id: "rat-1".to_string(),
        };
        let doc = load_draft("/nonexistent/draft.json", &fallback);
        assert_eq!(doc.metadata, fallback);
        assert!(doc.response.is_empty());

        let dir = std::env::temp_dir().join(format!("cccalc-drafts-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let broken = dir.join("broken.json").display().to_string();
        fs::write(&broken, "{\"metadata\": ").unwrap();
        let doc = load_draft(&broken, &fallback);
        assert_eq!(doc.metadata.rater_id, "rat-1");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn paths() {
        let settings = DraftSettings {
            directory: "drafts".to_string(),
            request_id: "req-9".to_string(),
        };
        let p = draft_path(Path::new("/data"), &settings);
        assert_eq!(p, "/data/drafts/req-9.json");
    }
}
