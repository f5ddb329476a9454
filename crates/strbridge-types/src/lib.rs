pub mod abi;

pub use abi::{
    decode_descriptor, encode_descriptor, ConventionKind, ExportNames, GuestSlice,
    DESCRIPTOR_ALIGN, DESCRIPTOR_SIZE, DESCRIPTOR_WORDS, MAX_LOG_MESSAGE_LEN, OOM_SENTINEL,
};
