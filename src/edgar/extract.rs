use crate::edgar::scratch::ScratchFile;
use crate::error::EdgarError;
use anyhow::{Context, Result};
use std::fs::File;
use std::io;
use std::path::Path;
use zip::ZipArchive;
use zip::result::ZipError;

pub struct LogArchive {
    name: String,
    inner: ZipArchive<File>,
}

impl LogArchive {
    /// A file that is not a readable zip is `EdgarError::CorruptArchive`;
    /// anything else is an ordinary I/O error.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let inner = ZipArchive::new(file).map_err(|err| match err {
            ZipError::Io(io_err) => {
                anyhow::Error::new(io_err).context(format!("failed to read {}", path.display()))
            }
            _ => EdgarError::CorruptArchive(path.display().to_string()).into(),
        })?;
        Ok(Self {
            name: path.display().to_string(),
            inner,
        })
    }

    pub fn member_names(&self, suffix: &str) -> Vec<String> {
        self.inner
            .file_names()
            .filter(|name| name.ends_with(suffix) && !name.ends_with('/'))
            .map(ToOwned::to_owned)
            .collect()
    }

    /// Extracts one member into `dest_dir` under its bare file name.
    pub fn extract_member(&mut self, member: &str, dest_dir: &Path) -> Result<ScratchFile> {
        let file_name = Path::new(member)
            .file_name()
            .with_context(|| format!("member {member} has no file name"))?;
        let target = ScratchFile::new(dest_dir.join(file_name));

        let mut entry = self.inner.by_name(member).map_err(|err| match err {
            ZipError::Io(io_err) => anyhow::Error::new(io_err),
            _ => EdgarError::CorruptArchive(format!("{}:{member}", self.name)).into(),
        })?;
        let mut out = File::create(target.path())
            .with_context(|| format!("failed to create {}", target.path().display()))?;
        io::copy(&mut entry, &mut out).map_err(|err| {
            if err.kind() == io::ErrorKind::InvalidData {
                EdgarError::CorruptArchive(format!("{}:{member}", self.name)).into()
            } else {
                anyhow::Error::new(err).context(format!("failed to extract {member}"))
            }
        })?;
        Ok(target)
    }
}
