use std::collections::HashMap;

use axum::extract::Multipart;
use jointly_assets::{AssetError, UploadedFile};
use tracing::warn;

/// A decoded multipart form: text fields by name, file parts in order.
#[derive(Debug, Default)]
pub struct FormParts {
    pub fields: HashMap<String, String>,
    pub files: Vec<(String, UploadedFile)>,
}

impl FormParts {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Every file submitted under `name`.
    pub fn take_files(&mut self, name: &str) -> Vec<UploadedFile> {
        let (matching, rest): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.files).into_iter().partition(|(field, _)| field == name);
        self.files = rest;
        matching.into_iter().map(|(_, file)| file).collect()
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.take_files(name).into_iter().next()
    }
}

/// Read a whole multipart body. A browser sends an empty, unnamed part for a
/// file input left blank; those are dropped here.
pub async fn read_form(mut multipart: Multipart) -> Result<FormParts, AssetError> {
    let mut form = FormParts::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Malformed multipart body: {}", e);
                return Err(AssetError::validation("the upload could not be read"));
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let data = field.bytes().await.map_err(|e| {
            warn!("Multipart field {:?} could not be read: {}", name, e);
            AssetError::validation("the upload could not be read")
        })?;

        match file_name {
            Some(file_name) if file_name.is_empty() && data.is_empty() => {}
            Some(file_name) => form.files.push((name, UploadedFile { file_name, data })),
            None => {
                let text = String::from_utf8_lossy(&data).into_owned();
                form.fields.insert(name, text);
            }
        }
    }

    Ok(form)
}
