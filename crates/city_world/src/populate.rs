//! Random person generation for world population.

use rand::Rng;

use crate::types::{Gender, PersonId, UnixMillis};
use crate::world_model::Person;

const MS_PER_DAY: i64 = 86_400_000;
/// 1960-01-01T00:00:00Z.
const BIRTH_WINDOW_START_MS: i64 = -315_619_200_000;
/// Days from the window start through the end of 2005.
const BIRTH_WINDOW_DAYS: i64 = 16_801;

static MALE_GIVEN_NAMES: &[&str] = &[
    "Arthur", "Daniel", "Edward", "Frank", "George", "Henry", "Isaac", "Jacob", "Karl", "Louis",
    "Marcus", "Nathan", "Oscar", "Peter", "Ramin", "Samuel", "Tomas", "Victor", "Walter", "Yusuf",
];

static FEMALE_GIVEN_NAMES: &[&str] = &[
    "Alice", "Beatriz", "Clara", "Diana", "Emma", "Farah", "Greta", "Hannah", "Irene", "Julia",
    "Katrin", "Leila", "Maryam", "Nora", "Olivia", "Parisa", "Rosa", "Sara", "Teresa", "Zahra",
];

static FAMILY_NAMES: &[&str] = &[
    "Abbott", "Bergmann", "Castillo", "Dalton", "Ebrahimi", "Fletcher", "Graves", "Holt",
    "Iwata", "Jansen", "Karimi", "Lindqvist", "Moreno", "Novak", "Ortiz", "Pereira", "Quinn",
    "Rahimi", "Sorensen", "Tehrani", "Ueda", "Vance", "Webber", "Zamani",
];

/// Generate a person with random name, gender, birth date, and national
/// code. New persons always start alive, in the city, unassigned.
pub fn generate_person(id: PersonId, now_ms: UnixMillis, rng: &mut impl Rng) -> Person {
    let gender = if rng.gen_bool(0.5) {
        Gender::Male
    } else {
        Gender::Female
    };
    let given = match gender {
        Gender::Male => MALE_GIVEN_NAMES[rng.gen_range(0..MALE_GIVEN_NAMES.len())],
        Gender::Female => FEMALE_GIVEN_NAMES[rng.gen_range(0..FEMALE_GIVEN_NAMES.len())],
    };
    let family = FAMILY_NAMES[rng.gen_range(0..FAMILY_NAMES.len())];
    let national_code = rng.gen_range(1_000_000_000u64..10_000_000_000u64).to_string();
    let birth_date_ms =
        BIRTH_WINDOW_START_MS + rng.gen_range(0..BIRTH_WINDOW_DAYS) * MS_PER_DAY;

    Person::new(
        id,
        format!("{given} {family}"),
        gender,
        birth_date_ms,
        national_code,
        now_ms,
    )
}
