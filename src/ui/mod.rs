pub mod embeds;
pub mod menus;
pub mod messages;
