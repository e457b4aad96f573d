//! Free-text persona catalog.
//!
//! Used only when a sample defines no attribute pools.

pub const PERSONA_CATALOG: &[&str] = &[
    "a 34-year-old primary school teacher from Leeds who plans every week in detail",
    "a 58-year-old retired firefighter who spends most mornings fishing",
    "a 22-year-old computer science student who works night shifts at a supermarket",
    "a 45-year-old single parent running a small bakery",
    "a 67-year-old former accountant who volunteers at a local library",
    "a 29-year-old nurse working in a busy accident and emergency department",
    "a 39-year-old freelance graphic designer who works from home",
    "a 51-year-old long-distance lorry driver",
    "a 26-year-old junior solicitor at a large city firm",
    "a 73-year-old grandmother who recently took up watercolour painting",
    "a 31-year-old software engineer who moved countries for work",
    "a 48-year-old farmer managing a family dairy farm",
    "a 19-year-old apprentice electrician",
    "a 55-year-old secondary school head teacher",
    "a 37-year-old stay-at-home father of three",
    "a 42-year-old call centre team leader",
    "a 63-year-old taxi driver who has lived in the same town all his life",
    "a 24-year-old professional musician juggling part-time jobs",
    "a 46-year-old hospital pharmacist",
    "a 33-year-old charity fundraiser who runs marathons",
];
