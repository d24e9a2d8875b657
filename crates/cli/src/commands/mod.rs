mod keys;
mod parse;
mod readers;
mod scan;

pub(crate) use keys::{KeysCommand, keys};
pub(crate) use parse::parse_file;
pub(crate) use readers::list_readers;
pub(crate) use scan::{Family, ScanArgs, scan};
