//! Hand landmark names and orderings.
//!
//! The landmark model outputs its 21 keypoints in a *level-interleaved* native order: first the
//! base joint of every finger, then the second joint of every finger, and so on up to the tips,
//! followed by the wrist. Within each level the fingers are ordered index, middle, ring, little,
//! thumb. In other words, native index `5 * level + finger` holds joint `level` of `finger`, and
//! native index 20 holds the wrist.
//!
//! Results are usually reported in the *user-friendly* finger-major order described by
//! [`HandLandmark`] instead (see [`USER_FRIENDLY_ORDER`]).
//!
//! # Terminology
//!
//! - **CMC**: [Carpometacarpal joint], the lowest joint of the thumb, located near the wrist.
//! - **MCP**: [Metacarpophalangeal joint], the lower joint forming the knuckles near the palm of
//!   the hand.
//! - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
//! - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
//! - **Tip**: This landmark is just placed on the tip of the finger, above the DIP.
//!
//! [Carpometacarpal joint]: https://en.wikipedia.org/wiki/Carpometacarpal_joint
//! [Metacarpophalangeal joint]: https://en.wikipedia.org/wiki/Metacarpophalangeal_joint

/// Number of landmarks estimated per hand.
pub const NUM_LANDMARKS: usize = 21;

/// Native index of the wrist landmark.
pub const NATIVE_WRIST: usize = 20;

/// Native index of the index finger's PIP joint.
///
/// Together with [`NATIVE_WRIST`] this defines the palm axis used to estimate the hand rotation.
pub const NATIVE_INDEX_FINGER_PIP: usize = 5;

/// Native index pairs whose distances estimate the size of the hand.
///
/// These are the distances from the wrist to the base of every finger, plus the wrist to the
/// thumb's MCP joint.
pub const NATIVE_HAND_SIZE_PAIRS: [(usize, usize); 6] = [
    (NATIVE_WRIST, 0),
    (NATIVE_WRIST, 1),
    (NATIVE_WRIST, 2),
    (NATIVE_WRIST, 3),
    (NATIVE_WRIST, 4),
    (NATIVE_WRIST, 9),
];

/// Names for the hand landmarks, in user-friendly order.
///
/// The discriminant of each variant is its index in a user-friendly coordinate list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandLandmark {
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
    Wrist,
}

impl HandLandmark {
    /// Returns the index of this landmark in the model's native output order.
    #[inline]
    pub fn native_index(self) -> usize {
        USER_FRIENDLY_ORDER[self as usize]
    }
}

/// Permutation from native order to user-friendly order.
///
/// `USER_FRIENDLY_ORDER[i]` is the native index of the landmark at user-friendly position `i`.
pub const USER_FRIENDLY_ORDER: [usize; NUM_LANDMARKS] = [
    4, 9, 14, 19, // thumb
    0, 5, 10, 15, // index
    1, 6, 11, 16, // middle
    2, 7, 12, 17, // ring
    3, 8, 13, 18, // little
    20, // wrist
];

/// Inverse of [`USER_FRIENDLY_ORDER`].
///
/// `NATIVE_ORDER[i]` is the user-friendly position of the landmark at native index `i`.
pub const NATIVE_ORDER: [usize; NUM_LANDMARKS] = invert(USER_FRIENDLY_ORDER);

const fn invert(perm: [usize; NUM_LANDMARKS]) -> [usize; NUM_LANDMARKS] {
    let mut inv = [0; NUM_LANDMARKS];
    let mut i = 0;
    while i < NUM_LANDMARKS {
        inv[perm[i]] = i;
        i += 1;
    }
    inv
}
