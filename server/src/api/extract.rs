//! Extractors that reject with [`AppError::Validation`] instead of axum's
//! plain-text rejections, so every failure shares one body shape.

use axum::extract::{FromRequest, FromRequestParts, Multipart, Request};
use axum::http::request::Parts;
use instagate_sdk::UploadFile;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

use crate::error::{AppError, AppResult};

/// URL-encoded form body. Repeated keys deserialize into `Vec` fields.
pub struct Form<T>(pub T);

impl<T, S> FromRequest<S> for Form<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum_extra::extract::Form(value) =
            axum_extra::extract::Form::<T>::from_request(req, state)
                .await
                .map_err(|e| AppError::validation(e.to_string()))?;
        Ok(Self(value))
    }
}

pub struct Query<T>(pub T);

impl<T, S> FromRequestParts<S> for Query<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let axum::extract::Query(value) =
            axum::extract::Query::<T>::from_request_parts(parts, state)
                .await
                .map_err(|e| AppError::validation(e.to_string()))?;
        Ok(Self(value))
    }
}

/// A fully buffered `multipart/form-data` body.
///
/// Parts with a file name are files, everything else is a text field. Empty
/// text values count as absent, matching how HTML forms submit blank inputs.
#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, Vec<String>>,
    files: Vec<(String, UploadFile)>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::validation(e.to_string()))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let content_type = field.content_type().map(str::to_string);
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::validation(e.to_string()))?;
                    let mut file = UploadFile::new(filename, data);
                    file.content_type = content_type;
                    form.files.push((name, file));
                }
                None => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| AppError::validation(e.to_string()))?;
                    form.fields.entry(name).or_default().push(value);
                }
            }
        }

        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)?
            .iter()
            .map(String::as_str)
            .find(|v| !v.trim().is_empty())
    }

    pub fn required_text(&self, name: &str) -> AppResult<&str> {
        self.text(name)
            .ok_or_else(|| AppError::validation(format!("missing field `{name}`")))
    }

    /// Every non-empty value of a repeated field.
    pub fn texts(&self, name: &str) -> Vec<String> {
        self.fields
            .get(name)
            .map(|values| {
                values
                    .iter()
                    .filter(|v| !v.trim().is_empty())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn file(&self, name: &str) -> Option<UploadFile> {
        self.files
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, f)| f.clone())
    }

    pub fn required_file(&self, name: &str) -> AppResult<UploadFile> {
        self.file(name)
            .ok_or_else(|| AppError::validation(format!("missing file `{name}`")))
    }

    pub fn files(&self, name: &str) -> Vec<UploadFile> {
        self.files
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, f)| f.clone())
            .collect()
    }
}

impl<S> FromRequest<S> for UploadForm
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| AppError::validation(e.to_string()))?;
        Self::read(multipart).await
    }
}

#[cfg(test)]
impl UploadForm {
    pub(crate) fn with_text(mut self, name: &str, value: &str) -> Self {
        self.fields
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
        self
    }

    pub(crate) fn with_file(mut self, name: &str, file: UploadFile) -> Self {
        self.files.push((name.to_string(), file));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_counts_as_missing() {
        let form = UploadForm::default()
            .with_text("caption", "  ")
            .with_text("sessionid", "abc");
        assert_eq!(form.text("caption"), None);
        assert_eq!(form.required_text("sessionid").unwrap(), "abc");
        assert!(matches!(
            form.required_text("caption"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn repeated_fields_and_files() {
        let form = UploadForm::default()
            .with_text("links", "https://a.example")
            .with_text("links", "")
            .with_text("links", "https://b.example")
            .with_file("files", UploadFile::new("1.jpg", vec![1u8]))
            .with_file("files", UploadFile::new("2.jpg", vec![2u8]))
            .with_file("thumbnail", UploadFile::new("t.jpg", vec![3u8]));

        assert_eq!(form.texts("links"), vec!["https://a.example", "https://b.example"]);
        assert_eq!(form.files("files").len(), 2);
        assert_eq!(form.file("thumbnail").unwrap().filename, "t.jpg");
        assert!(form.required_file("file").is_err());
    }
}
