use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes the collected download links, one URL per line. Every save
/// replaces the file so it always mirrors the in-memory list.
#[derive(Debug, Clone)]
pub struct LinkWriter {
    path: PathBuf,
}

impl LinkWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, links: &[String]) -> std::io::Result<()> {
        let file = File::create(&self.path)?;
        let mut writer = BufWriter::with_capacity(8192, file);

        for link in links {
            writeln!(writer, "{}", link)?;
        }

        writer.flush()?;
        writer.get_ref().sync_all()
    }
}
