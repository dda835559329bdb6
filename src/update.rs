//! # The unit of conversational input.

/// One incoming update (message, query, event) as delivered by a source.
///
/// The runtime treats updates as opaque and immutable. It only reads the sequence
/// number, which must increase strictly across the remote stream; the polling source
/// uses it as its fetch cursor and the ordering buffer uses it to restore order.
///
/// # Example
/// ```
/// use seedvisor::Update;
///
/// struct Message {
///     update_id: u64,
///     chat_id: i64,
///     text: String,
/// }
///
/// impl Update for Message {
///     fn seq(&self) -> u64 {
///         self.update_id
///     }
/// }
/// ```
pub trait Update: Send + Sync + 'static {
    /// Strictly increasing sequence number assigned by the remote side.
    fn seq(&self) -> u64;
}
