/*!

This is the long-form manual for `video_ranking` and `vidrank`.

## Workflow

A voting round ("activity") goes through the following steps:

1. Import the whitelist of students with `vidrank import-students`.
2. Create the activity from a video catalog file:
   `vidrank create-activity --title "Science week" --pin 1234 --videos videos.csv`.
   New activities start in `draft` and accept no ballots yet.
3. Open it: `vidrank set-status --activity 1 --status open`.
4. Students vote: `vidrank vote --activity 1 --group B1 --name "Ana Ruiz"
   --pin 1234 --ranking 3,1,2` (video ids best first, as listed by
   `vidrank videos --activity 1`).
5. Close it and read the results: `vidrank results --activity 1`.

Closing is reversible; reopening a closed activity keeps the ballots already
cast and accepts new ones. The video set, however, freezes as soon as the
first ballot lands: `bind-videos` on a voted activity is refused until the
ballots are explicitly purged.

## Input formats

Whitelists and video catalogs are read from CSV (`.csv`) or Excel (`.xlsx`)
files. The first row is treated as a header and columns are recognized by
keyword, so exports from common spreadsheet tools work unchanged; a file
whose header matches no keyword is rejected with an explicit error.

### Students

Two columns: group and student name. Header keywords: `group`/`grupo` and
`name`/`nombre`/`student`/`alumno`.

```text
Grupo,Nombre ALUMNO
B1,Ana Ruiz
B1,Luis Sol
B2,Mar Vidal
```

Names keep their case but internal whitespace is collapsed; group labels are
uppercased. Re-importing an existing student reactivates it rather than
creating a duplicate.

### Videos

Three columns: group, title and URL. Header keywords: `group`/`grupo`,
`title`/`titulo`/`name` and `url`/`link`/`enlace`.

```text
Grupo,Título,URL
B1,Recycling,https://example.org/a
B1,Solar,https://example.org/b
B2,Water,https://example.org/c
```

Rows missing any of the three fields are skipped and counted. An activity
needs at least two complete videos.

## Scoring

Scores use the Borda count: on each ballot, with V videos, the video at
position p (0 = best) earns `V - 1 - p` points. Points are summed across
ballots, videos are sorted by total descending and ties break by video id, so
recomputing the results always yields the same order. Nothing derived is ever
stored.

## Results summary

`vidrank results --activity N --out summary.json` writes a JSON summary of the
activity, the leaderboard and the participation numbers. With
`--reference old.json` the freshly computed summary is compared byte by byte
against the stored file and a diff is printed on mismatch, which makes
regression checks on a finished activity a one-liner.

*/
