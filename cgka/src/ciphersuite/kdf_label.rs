use cgka_traits::types::CryptoError;
use tls_codec::{Serialize, TlsSerialize, TlsSize, VLBytes};

use super::LABEL_PREFIX;

/// `KdfLabel` is later serialized and used in the `label` field of
/// `kdf_expand_label`.
///
/// ```text
/// struct {
///     uint16 length;
///     opaque label<V>;
///     opaque context<V>;
/// } KDFLabel;
/// ```
#[derive(TlsSerialize, TlsSize)]
pub(super) struct KdfLabel {
    length: u16,
    label: VLBytes,
    context: VLBytes,
}

impl KdfLabel {
    /// Serialize this label. The `label` gets the protocol prefix.
    ///
    /// Returns an error if the `length` does not fit into a `u16`.
    pub(super) fn serialized_label(
        context: &[u8],
        label: &str,
        length: usize,
    ) -> Result<Vec<u8>, CryptoError> {
        let length = u16::try_from(length).map_err(|_| {
            log::error!("Trying to derive a key with a too large length field!");
            CryptoError::KdfLabelTooLarge
        })?;
        log::trace!(
            "KDF Label:\n length: {:?}\n label: {:?}\n context: {:x?}",
            length,
            label,
            context
        );
        let kdf_label = KdfLabel {
            length,
            label: format!("{LABEL_PREFIX}{label}").as_bytes().into(),
            context: context.into(),
        };
        kdf_label
            .tls_serialize_detached()
            .map_err(|_| CryptoError::KdfSerializationError)
    }
}
