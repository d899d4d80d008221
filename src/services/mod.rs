pub mod auth_service;
pub mod doc_edit_service;
