pub mod crawl;
pub mod delete_document;
pub mod file_upload;
pub mod recrawl;

pub fn collection_name(bot_id: uuid::Uuid) -> String {
    format!("bot_{}", bot_id.simple())
}
