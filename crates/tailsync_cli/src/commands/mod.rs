pub(crate) mod checkpoint;
pub(crate) mod meta;
pub(crate) mod migrate;
pub(crate) mod sync;
