use std::{
    collections::{BTreeMap, HashSet},
    path::Path,
};

use tracing::{debug, warn};

use crate::storage::StorageClient;

pub const HOME_PREFIXES: [&str; 2] = ["images-homepage/", "ivida-images/images-homepage/"];
pub const LEADER_PREFIXES: [&str; 2] = ["ministries-images/", "ivida-images/ministries-images/"];

const HOME_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];
const LEADER_EXTENSIONS: [&str; 4] = [".jpg", ".jpeg", ".png", ".webp"];
const LIST_LIMIT: i32 = 200;

/// Blob folder names that do not follow the `<slug>-leader` convention.
const FOLDER_TO_SLUG: [(&str, &str); 13] = [
    ("kids-leader", "kids"),
    ("youth-leader", "youth"),
    ("worship-leader", "worship"),
    ("worship'-leader", "worship"),
    ("intercession-leader", "intercession"),
    ("men-leader", "men"),
    ("mans-images", "men"),
    ("women-leader", "women"),
    ("womans-image", "women"),
    ("family-leader", "family"),
    ("family-image", "family"),
    ("media-leader", "media"),
    ("media-image", "media"),
];

fn has_extension(name: &str, extensions: &[&str]) -> bool {
    let lower = name.to_lowercase();
    !lower.ends_with('/') && extensions.iter().any(|ext| lower.ends_with(ext))
}

/// `<prefix><folder>/<file>` → ministry slug.
pub fn slug_from_key(key: &str, prefix: &str) -> Option<String> {
    let rest = key.strip_prefix(prefix)?;
    let parts: Vec<&str> = rest.split('/').filter(|p| !p.is_empty()).collect();
    if parts.len() < 2 || !has_extension(parts[parts.len() - 1], &LEADER_EXTENSIONS) {
        return None;
    }
    let folder = parts[0].to_lowercase();
    FOLDER_TO_SLUG
        .iter()
        .find(|(name, _)| *name == folder)
        .map(|(_, slug)| slug.to_string())
        .or_else(|| folder.strip_suffix("-leader").map(str::to_string))
}

/// Same escaping as JavaScript's `encodeURIComponent`.
pub fn encode_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// Homepage carousel: first prefix with images wins. Storage errors degrade to an empty list.
pub async fn home_images(storage: Option<&dyn StorageClient>) -> Vec<String> {
    let Some(storage) = storage else {
        return Vec::new();
    };

    let mut urls = Vec::new();
    for prefix in HOME_PREFIXES {
        match storage.list_objects(prefix, LIST_LIMIT).await {
            Ok(keys) => urls.extend(
                keys.iter()
                    .filter(|k| k.starts_with(prefix) && has_extension(k, &HOME_EXTENSIONS))
                    .map(|k| storage.public_url(k)),
            ),
            Err(e) => warn!(error = %e, prefix, "homepage image listing failed"),
        }
        if !urls.is_empty() {
            break;
        }
    }

    let mut seen = HashSet::new();
    urls.retain(|u| seen.insert(u.clone()));
    urls
}

/// Slug → photo URL. Blob images take precedence over `<public>/ministries-image/<slug>-leader/`.
pub async fn leader_images(
    storage: Option<&dyn StorageClient>,
    public_dir: Option<&Path>,
) -> BTreeMap<String, String> {
    let mut images = BTreeMap::new();

    if let Some(storage) = storage {
        for prefix in LEADER_PREFIXES {
            let keys = match storage.list_objects(prefix, LIST_LIMIT).await {
                Ok(keys) => keys,
                Err(e) => {
                    warn!(error = %e, prefix, "leader image listing failed");
                    break;
                }
            };
            for key in &keys {
                if let Some(slug) = slug_from_key(key, prefix) {
                    images.entry(slug).or_insert_with(|| storage.public_url(key));
                }
            }
            if !images.is_empty() {
                break;
            }
        }
    }

    if let Some(dir) = public_dir {
        fill_from_public(&mut images, &dir.join("ministries-image")).await;
    }
    images
}

async fn sorted_entries(dir: &Path) -> std::io::Result<Vec<(String, bool)>> {
    let mut reader = tokio::fs::read_dir(dir).await?;
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        entries.push((entry.file_name().to_string_lossy().into_owned(), is_dir));
    }
    entries.sort();
    Ok(entries)
}

async fn fill_from_public(images: &mut BTreeMap<String, String>, root: &Path) {
    let dirs = match sorted_entries(root).await {
        Ok(d) => d,
        Err(e) => {
            debug!(error = %e, path = %root.display(), "no local leader images");
            return;
        }
    };

    for (dir, is_dir) in dirs {
        let Some(slug) = dir.strip_suffix("-leader") else {
            continue;
        };
        if !is_dir || images.contains_key(slug) {
            continue;
        }
        let Ok(files) = sorted_entries(&root.join(&dir)).await else {
            continue;
        };
        if let Some((file, _)) = files
            .iter()
            .find(|(name, is_dir)| !is_dir && has_extension(name, &LEADER_EXTENSIONS))
        {
            images.insert(
                slug.to_string(),
                format!("/ministries-image/{dir}/{}", encode_component(file)),
            );
        }
    }
}

/// Image files under `<public>/imagens-iforte`, sorted by name.
pub async fn iforte_images(public_dir: Option<&Path>) -> Vec<String> {
    let Some(dir) = public_dir else {
        return Vec::new();
    };
    match sorted_entries(&dir.join("imagens-iforte")).await {
        Ok(entries) => entries
            .into_iter()
            .filter(|(name, is_dir)| !is_dir && has_extension(name, &HOME_EXTENSIONS))
            .map(|(name, _)| format!("/imagens-iforte/{name}"))
            .collect(),
        Err(e) => {
            debug!(error = %e, "imagens-iforte not readable");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::storage::fake::FakeStorage;

    /// Scratch directory removed on drop.
    struct ScratchDir(PathBuf);

    impl ScratchDir {
        fn new() -> Self {
            let path = std::env::temp_dir().join(format!("ivida-gallery-{}", uuid::Uuid::new_v4()));
            std::fs::create_dir_all(&path).unwrap();
            Self(path)
        }

        fn touch(&self, rel: &str) {
            let path = self.0.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, b"img").unwrap();
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn slugs_follow_folder_table_then_suffix() {
        let p = "ministries-images/";
        let slug = |key: &str| slug_from_key(key, p);
        assert_eq!(slug("ministries-images/mans-images/joao.jpg").as_deref(), Some("men"));
        assert_eq!(slug("ministries-images/Worship'-Leader/a.PNG").as_deref(), Some("worship"));
        assert_eq!(slug("ministries-images/dance-leader/a.webp").as_deref(), Some("dance"));
        assert_eq!(slug("ministries-images/random/a.jpg"), None);
        assert_eq!(slug("ministries-images/kids-leader/notes.txt"), None);
        assert_eq!(slug("ministries-images/a.jpg"), None);
        assert_eq!(slug("other/kids-leader/a.jpg"), None);
    }

    #[test]
    fn encodes_like_encode_uri_component() {
        assert_eq!(encode_component("Pr. João (1).jpg"), "Pr.%20Jo%C3%A3o%20(1).jpg");
        assert_eq!(encode_component("a&b=c"), "a%26b%3Dc");
    }

    #[tokio::test]
    async fn home_falls_back_to_store_prefixed_keys() {
        let fake = FakeStorage::with_keys(&[
            "ivida-images/images-homepage/",
            "ivida-images/images-homepage/b.JPG",
            "ivida-images/images-homepage/a.webp",
            "ivida-images/images-homepage/readme.txt",
        ]);
        let images = home_images(Some(&fake as &dyn StorageClient)).await;
        assert_eq!(
            images,
            vec![
                "https://fake.local/ivida-images/images-homepage/a.webp",
                "https://fake.local/ivida-images/images-homepage/b.JPG",
            ]
        );
    }

    #[tokio::test]
    async fn home_prefers_first_prefix() {
        let fake = FakeStorage::with_keys(&[
            "images-homepage/one.png",
            "ivida-images/images-homepage/two.png",
        ]);
        let images = home_images(Some(&fake as &dyn StorageClient)).await;
        assert_eq!(images, vec!["https://fake.local/images-homepage/one.png"]);
        assert!(home_images(None).await.is_empty());
    }

    #[tokio::test]
    async fn leaders_take_first_blob_then_fill_from_public() {
        let fake = FakeStorage::with_keys(&[
            "ministries-images/kids-leader/a.jpg",
            "ministries-images/kids-leader/b.jpg",
            "ministries-images/womans-image/c.png",
        ]);
        let public = ScratchDir::new();
        public.touch("ministries-image/kids-leader/local.jpg");
        public.touch("ministries-image/youth-leader/Pr Ana.jpg");
        public.touch("ministries-image/youth-leader/z.png");
        public.touch("ministries-image/media-leader/notes.txt");

        let images =
            leader_images(Some(&fake as &dyn StorageClient), Some(public.0.as_path())).await;
        let url = |slug: &str| images.get(slug).map(String::as_str);
        assert_eq!(
            url("kids"),
            Some("https://fake.local/ministries-images/kids-leader/a.jpg")
        );
        assert_eq!(
            url("women"),
            Some("https://fake.local/ministries-images/womans-image/c.png")
        );
        assert_eq!(url("youth"), Some("/ministries-image/youth-leader/Pr%20Ana.jpg"));
        assert!(!images.contains_key("media"));
    }

    #[tokio::test]
    async fn iforte_lists_sorted_images_or_nothing() {
        let public = ScratchDir::new();
        assert!(iforte_images(Some(public.0.as_path())).await.is_empty());

        public.touch("imagens-iforte/b.png");
        public.touch("imagens-iforte/a.gif");
        public.touch("imagens-iforte/doc.pdf");
        assert_eq!(
            iforte_images(Some(public.0.as_path())).await,
            vec!["/imagens-iforte/a.gif", "/imagens-iforte/b.png"]
        );
        assert!(iforte_images(None).await.is_empty());
    }
}
