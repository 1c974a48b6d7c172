/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

pub mod fetch;
pub mod response;

pub const HTTP_PORT: u16 = 80;

/// Largest object body accepted by default.
pub const MAX_OBJECT_SIZE: usize = 102400;

/// Longest status or header line accepted, terminator included.
pub const MAX_LINE_LENGTH: usize = 8192;
