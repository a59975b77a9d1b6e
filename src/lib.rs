//! Turns the page text of the IBGE POF 2008-2009 nutrition tables into one
//! record per food and preparation, merged across the four table passes.

pub mod classify;
pub mod fields;
pub mod merge;
pub mod metrics;
pub mod output;
pub mod parser;
pub mod passes;
pub mod settings;
pub mod source;
pub mod validate;
