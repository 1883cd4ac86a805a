//! Session album packaging.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::store::StorageError;

/// Package finished session images into one in-memory ZIP album.
///
/// Entries are named `photo_001.jpg` onward, matching the object key
/// layout, so the album unpacks into the same names the chat delivery
/// used.
pub fn build_album(images: &[Vec<u8>]) -> Result<Vec<u8>, StorageError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (index, bytes) in images.iter().enumerate() {
        writer
            .start_file(format!("photo_{:03}.jpg", index + 1), options)
            .map_err(|e| StorageError::Archive(e.to_string()))?;
        writer
            .write_all(bytes)
            .map_err(|e| StorageError::Archive(e.to_string()))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| StorageError::Archive(e.to_string()))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn album_round_trips_all_entries() {
        let images = vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()];
        let album = build_album(&images).unwrap();

        let mut zip = zip::ZipArchive::new(Cursor::new(album)).unwrap();
        assert_eq!(zip.len(), 3);

        let mut entry = zip.by_name("photo_002.jpg").unwrap();
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"second");
    }

    #[test]
    fn empty_album_is_a_valid_zip() {
        let album = build_album(&[]).unwrap();
        let zip = zip::ZipArchive::new(Cursor::new(album)).unwrap();
        assert_eq!(zip.len(), 0);
    }
}
