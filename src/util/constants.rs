/// log2 of the number of bytes in a word
pub const LOG_BYTES_IN_WORD: u8 = 3;
/// The number of bytes in a word
pub const BYTES_IN_WORD: usize = 1 << LOG_BYTES_IN_WORD;

/// log2 of the number of bytes in a kilobyte
pub const LOG_BYTES_IN_KBYTE: u8 = 10;
/// The number of bytes in a kilobyte
pub const BYTES_IN_KBYTE: usize = 1 << LOG_BYTES_IN_KBYTE;

/// The number of header words in an object: the type-descriptor word and the
/// length word.
pub const HEADER_WORDS: usize = 2;

/// The largest number of fields an object may have. Bounds the slot snapshot
/// a marking visitor keeps, so it is a hard contract for the arena, not a
/// soft limit.
pub const MAX_OBJECT_SLOTS: usize = 255;

/// The number of background marking tasks. Task id 0 is reserved for the
/// foreground thread, so per-task arrays have `TASK_COUNT + 1` entries.
pub const TASK_COUNT: usize = 4;
