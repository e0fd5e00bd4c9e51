use bytes::Bytes;

/// One application data packet destined for a logical stream.
///
/// Carries the fields the page encoder needs alongside the payload:
/// granule position, packet number, and the begin/end-of-stream flags.
#[derive(Clone, Debug)]
pub struct Packet {
    data: Bytes,
    granule_pos: i64,
    packet_no: i64,
    bos: bool,
    eos: bool,
}

impl Packet {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            granule_pos: 0,
            packet_no: 0,
            bos: false,
            eos: false,
        }
    }

    pub fn with_granule_pos(mut self, granule_pos: i64) -> Self {
        self.granule_pos = granule_pos;
        self
    }

    pub fn with_packet_no(mut self, packet_no: i64) -> Self {
        self.packet_no = packet_no;
        self
    }

    /// Marks this packet as the first of its stream.
    pub fn begin_of_stream(mut self) -> Self {
        self.bos = true;
        self
    }

    /// Marks this packet as the last of its stream. Submitting it also
    /// requests a forced flush from the multiplexer.
    pub fn end_of_stream(mut self) -> Self {
        self.eos = true;
        self
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn granule_pos(&self) -> i64 {
        self.granule_pos
    }

    pub fn packet_no(&self) -> i64 {
        self.packet_no
    }

    pub fn is_bos(&self) -> bool {
        self.bos
    }

    pub fn is_eos(&self) -> bool {
        self.eos
    }
}
