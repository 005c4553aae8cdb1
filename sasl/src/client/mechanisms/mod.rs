// Copyright (c) 2025 skylark contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The mechanism implementations.

mod digest_md5;
mod plain;
mod scram;

pub use self::digest_md5::DigestMd5;
pub use self::plain::Plain;
pub use self::scram::Scram;
