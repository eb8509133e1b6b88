// Read-only string region: maps a blob of packed fields and positions readers inside it.
use std::fs::File;
use std::io;
use std::path::Path;

use memmap2::Mmap;

use crate::core::entity::DataSetRef;
use crate::core::error::{Error, ErrorKind};
use crate::core::field::StringField;
use crate::core::reader::{BinaryRead, FieldReader};

enum Backing {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Backing {
    fn as_slice(&self) -> &[u8] {
        match self {
            Backing::Mapped(mmap) => &mmap[..],
            Backing::Owned(bytes) => bytes.as_slice(),
        }
    }
}

pub struct StringRegion {
    data_set: DataSetRef,
    bytes: Backing,
}

impl StringRegion {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|err| Error::new(open_error_kind(&err)).with_path(path).with_source(err))?;
        let len = file
            .metadata()
            .map(|meta| meta.len())
            .map_err(|err| Error::new(ErrorKind::Io).with_path(path).with_source(err))?;

        // Zero-length mappings are rejected on some platforms.
        let bytes = if len == 0 {
            Backing::Owned(Vec::new())
        } else {
            let mmap = unsafe {
                Mmap::map(&file)
                    .map_err(|err| Error::new(ErrorKind::Io).with_path(path).with_source(err))?
            };
            Backing::Mapped(mmap)
        };

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        tracing::debug!(path = %path.display(), len, "opened string region");

        Ok(Self {
            data_set: DataSetRef::with_path(name, path),
            bytes,
        })
    }

    pub fn from_bytes(data_set: DataSetRef, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            data_set,
            bytes: Backing::Owned(bytes.into()),
        }
    }

    pub fn data_set(&self) -> &DataSetRef {
        &self.data_set
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Decodes the single field whose length prefix starts at `offset`.
    pub fn field_at(&self, offset: u64) -> Result<StringField, Error> {
        let start = self.start(offset)?;
        let mut reader = FieldReader::at(&self.as_bytes()[start..], offset);
        StringField::read(&self.data_set, offset, &mut reader)
    }

    /// Walks every field from the start of the region.
    pub fn fields(&self) -> Fields<'_> {
        Fields {
            region: self,
            reader: FieldReader::new(self.as_bytes()),
            done: false,
        }
    }

    /// Walks fields starting at `offset`, which must land on a length prefix.
    pub fn fields_from(&self, offset: u64) -> Result<Fields<'_>, Error> {
        if offset == self.len() as u64 {
            return Ok(Fields {
                region: self,
                reader: FieldReader::at(&self.as_bytes()[..0], offset),
                done: true,
            });
        }
        let start = self.start(offset)?;
        Ok(Fields {
            region: self,
            reader: FieldReader::at(&self.as_bytes()[start..], offset),
            done: false,
        })
    }

    fn start(&self, offset: u64) -> Result<usize, Error> {
        usize::try_from(offset)
            .ok()
            .filter(|start| *start < self.len())
            .ok_or_else(|| {
                Error::new(ErrorKind::NotFound)
                    .with_message(format!(
                        "offset is outside the {} byte string region",
                        self.len()
                    ))
                    .with_data_set(self.data_set.name())
                    .with_offset(offset)
            })
    }
}

/// Sequential walk over back-to-back fields; stops after the first error.
pub struct Fields<'a> {
    region: &'a StringRegion,
    reader: FieldReader<&'a [u8]>,
    done: bool,
}

impl Iterator for Fields<'_> {
    type Item = Result<StringField, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.reader.position() >= self.region.len() as u64 {
            return None;
        }
        let offset = self.reader.position();
        let result = StringField::read(&self.region.data_set, offset, &mut self.reader);
        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}

fn open_error_kind(err: &io::Error) -> ErrorKind {
    match err.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        _ => ErrorKind::Io,
    }
}
