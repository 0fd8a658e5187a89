//! Pictures anchored to worksheet cells.

use super::PackageEditor;
use crate::ooxml::opc::PartOrigin;
use crate::ooxml::opc::constants::{content_type, relationship_type};
use crate::ooxml::opc::packuri;
use crate::ooxml::xlsx::cell::CellRange;
use crate::ooxml::xlsx::dirty::DirtyLevel;
use crate::ooxml::xlsx::error::{PackageError, Result};
use crate::ooxml::xlsx::writer::{append_anchor, drawing_part, next_shape_id, picture_anchor};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

const MEDIA_DIR: &str = "xl/media/";

impl PackageEditor {
    /// Anchor a picture over `range` (`"B2:D8"`, or a single cell) on a
    /// sheet. `mime` is the image's media type, such as `image/png`.
    ///
    /// Identical image bytes are stored once per package. The sheet's
    /// drawing is created on first use; later pictures are appended to it.
    pub fn add_image(&mut self, sheet: &str, range: &str, bytes: &[u8], mime: &str) -> Result<()> {
        let anchor_range = CellRange::parse(range)
            .ok_or_else(|| PackageError::validation(format!("\"{range}\" is not a cell range")))?;
        let ext = content_type::image_extension(mime)
            .ok_or_else(|| PackageError::validation(format!("unsupported image type \"{mime}\"")))?;
        if bytes.is_empty() {
            return Err(PackageError::validation("image data is empty"));
        }
        let sheet_path = self.sheet_path(sheet)?;
        let drawing_rel = self
            .worksheet_mut(&sheet_path)?
            .drawing_rel()
            .map(str::to_string);
        let existing = drawing_rel
            .as_deref()
            .and_then(|id| self.graph.rels(&sheet_path)?.get(id)?.target_part(&sheet_path))
            .filter(|p| self.graph.contains(p));
        let existing = match existing {
            Some(drawing) => {
                let src = self.part_bytes(&drawing)?;
                Some((drawing, src))
            },
            None => None,
        };

        let media = self.media_part(bytes, ext, mime)?;
        match existing {
            Some((drawing, src)) => {
                let rel_id = self.graph.relate(&drawing, relationship_type::IMAGE, &media)?;
                self.dirty.add_dependency(&packuri::rels_path_for(&drawing), &media);
                let shape_id = next_shape_id(&src);
                let anchor = picture_anchor(anchor_range, &rel_id, shape_id, &format!("Picture {shape_id}"));
                let updated = append_anchor(&src, &anchor).map_err(|e| PackageError::xml(drawing.as_str(), e))?;
                self.graph
                    .set_origin(&drawing, PartOrigin::Blob(Arc::new(updated)))?;
                self.dirty.mark_dirty(&drawing, DirtyLevel::Content, None);
                log::debug!("{media} anchored at {range} in {drawing}");
            },
            None => {
                let drawing = self.free_part_name("xl/drawings/drawing", "xml");
                let sheet_rel = self.attach_part(
                    &drawing,
                    PartOrigin::Blob(Arc::new(Vec::new())),
                    Some(content_type::DML_DRAWING),
                    &sheet_path,
                    relationship_type::DRAWING,
                )?;
                let rel_id = self.graph.relate(&drawing, relationship_type::IMAGE, &media)?;
                self.dirty.add_dependency(&packuri::rels_path_for(&drawing), &media);
                let part = drawing_part(&picture_anchor(anchor_range, &rel_id, 1, "Picture 1"));
                self.graph.set_origin(&drawing, PartOrigin::Blob(Arc::new(part)))?;
                self.worksheet_mut(&sheet_path)?.set_drawing_rel(&sheet_rel);
                self.dirty
                    .mark_dirty(&sheet_path, DirtyLevel::Content, Some("drawing"));
                log::debug!("{media} anchored at {range} in new {drawing}");
            },
        }
        Ok(())
    }

    /// Member name holding `bytes`, adding a media part if no identical
    /// image exists.
    fn media_part(&mut self, bytes: &[u8], ext: &str, mime: &str) -> Result<String> {
        let digest = Sha256::digest(bytes).to_vec();
        if self.media.is_none() {
            self.media = Some(self.index_media()?);
        }
        if let Some(path) = self.media.as_ref().and_then(|m| m.get(&digest))
            && self.graph.contains(path)
        {
            return Ok(path.clone());
        }

        let path = self.free_part_name("xl/media/image", ext);
        self.graph
            .add_part(&path, PartOrigin::Blob(Arc::new(bytes.to_vec())));
        if !self.content_types.has_default(ext) {
            self.content_types
                .add_default(ext, content_type::for_image_extension(ext).unwrap_or(mime));
        }
        self.dirty.mark_dirty(&path, DirtyLevel::Structure, None);
        if let Some(index) = self.media.as_mut() {
            index.insert(digest, path.clone());
        }
        Ok(path)
    }

    fn index_media(&self) -> Result<HashMap<Vec<u8>, String>> {
        let media: Vec<String> = self
            .graph
            .part_paths()
            .filter(|p| p.starts_with(MEDIA_DIR))
            .map(str::to_string)
            .collect();
        let mut index = HashMap::with_capacity(media.len());
        for path in media {
            let bytes = self.part_bytes(&path)?;
            index.entry(Sha256::digest(&bytes).to_vec()).or_insert(path);
        }
        Ok(index)
    }
}
